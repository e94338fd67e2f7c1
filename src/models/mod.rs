pub mod alert;
pub mod assessment;
pub mod entity;
pub mod risk_flag;
pub mod tender;

pub use alert::*;
pub use assessment::*;
pub use entity::*;
pub use risk_flag::*;
pub use tender::*;
