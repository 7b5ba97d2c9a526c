//! CLI command implementations.
//!
//! | Module      | Commands handled       |
//! |-------------|------------------------|
//! | `serve`     | `Serve`                |
//! | `claude_md` | `Check`, `Generate`    |
//! | `pr_status` | `PrStatus`             |
//! | `config`    | `Config`               |

pub mod claude_md;
pub mod config;
pub mod pr_status;
pub mod serve;

pub use claude_md::{cmd_check, cmd_generate};
pub use config::{cmd_config, cmd_config_init};
pub use pr_status::cmd_pr_status;
pub use serve::cmd_serve;
