pub mod params;
pub mod schema;
pub mod steps;

pub use params::{ParamDef, Params};
pub use schema::{
    BrowserConfig, Condition, Config, OnFailure, PollConfig, RetryConfig, SuccessCondition,
    TargetUrl, Viewport,
};
pub use steps::{ReconcileExpectation, Step};
