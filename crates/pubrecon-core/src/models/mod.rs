pub mod person;
pub mod publication;
pub mod report;
pub mod source;

pub use person::*;
pub use publication::*;
pub use report::*;
pub use source::*;
