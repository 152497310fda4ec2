pub mod lab_report;
pub mod ocr_job;
pub mod responses;
pub mod user;
pub mod workspace;

pub use lab_report::*;
pub use ocr_job::*;
pub use responses::*;
pub use user::*;
pub use workspace::*;