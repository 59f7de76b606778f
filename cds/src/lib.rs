//! CardSync - sync scraped card data into a remote store
//!
//! Each configured job reads rows from a local SQLite database the scraper
//! writes, maps them with a declarative field mapping and upserts them in
//! batches into one destination table, using the `batchsync` engine.
//!
//! ```yaml
//! destination:
//!   kind: postgrest
//!   base-url: https://xyz.supabase.co
//!   api-key-env: SUPABASE_SERVICE_KEY
//! jobs:
//!   - name: cards
//!     source-path: data/cards.db
//!     query: { table: cards, order-by: [id] }
//!     language-column: language
//!     table: cards
//!     conflict-key: [card_id, language]
//! ```

pub mod cli;
pub mod config;
pub mod render;
pub mod runner;
