#![allow(dead_code)]

pub mod builders;
pub mod stages;

pub use builders::{Harness, PipelineSetBuilder};
pub use stages::{dyn_stages, ScriptedStage, StageScript};
