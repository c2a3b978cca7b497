//! # lcpipe
//!
//! Postage-stamp light-curve reduction core.
//!
//! This crate turns a time series of small pixel images ("postage stamps") of a
//! star into an aperture-summed light curve with propagated uncertainty, applies
//! an additive de-trending model, and lays the result out on a one-page
//! multi-panel report.
//!
//! ## Architecture
//!
//! - [`models`]: pixel stamps, apertures, de-trended series and light curves
//! - [`report`]: textual page layouts, report pages and renderers
//! - [`mission`]: the capability set a telescope mission supplies (acquisition,
//!   default aperture, cadence, identifiers, layout), plus the K2 mission
//! - [`detrend`]: the de-trending collaborator contract
//! - [`target`]: the per-star pipeline state machine
//! - [`batch`]: processing independent targets in parallel
//! - [`config`] and [`telemetry`]: configuration files and run-scoped logging
//!
//! ## Example
//!
//! ```no_run
//! use lcpipe::detrend::ZeroModel;
//! use lcpipe::mission::k2::K2;
//! use lcpipe::report::SvgRenderer;
//! use lcpipe::target::Target;
//! use std::path::Path;
//!
//! let mut star = Target::new(K2::new("/data/lcpipe"), 205071984u64);
//! let report = star
//!     .run(&ZeroModel, &SvgRenderer::default(), Path::new("reports"))
//!     .expect("pipeline failed");
//! println!("{} -> {}", star, report.display());
//! ```

pub mod batch;
pub mod config;
pub mod detrend;
pub mod error;
pub mod mission;
pub mod models;
pub mod report;
pub mod target;
pub mod telemetry;

pub use error::{PipelineError, PipelineResult};
pub use models::{Aperture, DetrendedSeries, Lightcurve, PixelStamp, Season, TargetId};
pub use target::{PipelineState, Target, TargetError};
