pub mod emergency;
pub mod enums;
pub mod health_id;
pub mod otp;
pub mod patch;
pub mod record;
pub mod reminder;
pub mod user;

pub use emergency::*;
pub use health_id::*;
pub use otp::*;
pub use patch::*;
pub use record::*;
pub use reminder::*;
pub use user::*;
