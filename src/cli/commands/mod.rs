//! CLI command implementations.

mod chat;
mod config;
mod doctor;
mod list;
mod podcast;
mod research;
mod schedule;
mod search;
mod serve;
mod worker;

pub use chat::run_chat;
pub use config::run_config;
pub use doctor::run_doctor;
pub use list::{run_articles, run_costs, run_list};
pub use podcast::run_podcast;
pub use research::run_research;
pub use schedule::run_schedule;
pub use search::{run_scrape, run_search};
pub use serve::run_serve;
pub use worker::{run_scheduler, run_worker};
