//! # partinit engine
//!
//! Orchestrates a partition table initialization:
//! - **config**: turns raw options into one validated [`ResolvedConfig`]
//! - **init**: builds the MBR or GPT structures and commits them in order
//! - **inspect**: reads a table back and verifies its checksums
//! - **render**: hex dumps for dry runs
//!
//! Every request ends in exactly one [`Outcome`].
//!
//! ## Example
//!
//! ```rust,no_run
//! use partinit_core::OsRandom;
//! use partinit_engine::{run, InitOptions, Outcome, Request};
//!
//! let options = InitOptions {
//!     image: Some("disk.img".into()),
//!     dry_run: true,
//!     ..Default::default()
//! };
//!
//! match run(Request::InitTable(options), &mut OsRandom) {
//!     Outcome::Success(report) => println!("{:?}", report),
//!     Outcome::Failure(e) => eprintln!("Error: {}", e),
//!     Outcome::NoWork => {}
//! }
//! ```

pub mod config;
pub mod init;
pub mod inspect;
pub mod render;

pub use config::{resolve, InitOptions, ResolvedConfig, TableKind, TableSettings};
pub use init::InitReport;
pub use inspect::{InspectOptions, InspectReport};
pub use render::RenderedStructure;

use partinit_core::{Error, RandomSource};
use serde::Serialize;

/// A unit of work
#[derive(Debug, Clone)]
pub enum Request {
    /// Initialize a partition table
    InitTable(InitOptions),
    /// Verify the table on an image
    Inspect(InspectOptions),
    /// Nothing to build (help or usage was requested)
    Help,
}

/// Report carried by a successful outcome
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "operation", rename_all = "snake_case")]
pub enum Report {
    Init(InitReport),
    Inspect(InspectReport),
}

/// Terminal result of a request
#[derive(Debug)]
pub enum Outcome {
    Success(Report),
    Failure(Error),
    NoWork,
}

impl Outcome {
    /// Whether the process should exit successfully
    pub fn is_success(&self) -> bool {
        !matches!(self, Outcome::Failure(_))
    }
}

/// Execute `request`, drawing any needed randomness from `rng`
pub fn run(request: Request, rng: &mut dyn RandomSource) -> Outcome {
    let result = match request {
        Request::Help => return Outcome::NoWork,
        Request::InitTable(options) => {
            resolve(options, rng).and_then(|config| init::init_table(config).map(Report::Init))
        }
        Request::Inspect(options) => inspect::inspect(options).map(Report::Inspect),
    };

    match result {
        Ok(report) => Outcome::Success(report),
        Err(e) => {
            if e.is_fail_fast() {
                tracing::error!("Rejected before writing: {}", e);
            } else {
                tracing::error!("{}", e);
            }
            Outcome::Failure(e)
        }
    }
}
