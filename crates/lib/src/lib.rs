//! trellis-lib: the analysis phase of the trellis build system
//!
//! Rules are analyzed as cooperative tasks that talk to a host engine through
//! batches of requests and responses:
//! - `Label` / `LabelPath`: addresses of targets, packages and files
//! - `RuleClass` / `Attribute` / `Provider`: typed rule schemas and their outputs
//! - `Action`: content-addressed units of build work recorded during analysis
//! - `DepmapBuilder`: virtual directory trees describing action inputs
//! - `Task` / `Group`: the scheduler multiplexing host round trips
//! - `Driver`: the `start` / `poll` boundary used by the host

pub mod action;
pub mod attribute;
pub mod codec;
pub mod config;
pub mod consts;
pub mod depmap;
pub mod driver;
pub mod error;
pub mod exec;
pub mod glob;
pub mod label;
#[cfg(feature = "logging")]
pub mod logging;
pub mod platform;
pub mod protocol;
pub mod provider;
pub mod reference;
pub mod rule;
pub mod script;
pub mod task;
pub mod util;
pub mod value;
pub mod workspace;

pub use driver::{Driver, DriverError, RuleRegistry};
pub use error::{AnalysisError, AnalysisResult};
pub use label::{Label, LabelPath};
pub use rule::{Analyze, RuleClass, RuleContext};
