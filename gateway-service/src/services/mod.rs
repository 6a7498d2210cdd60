//! Services layer for the gateway.
//!
//! Token codec, admission state, the invite workflow, account sign-in and
//! mail dispatch.

mod account;
pub mod admission;
mod email;
pub mod error;
mod invite;
mod jwt;

pub use account::{AccountService, Session};
pub use admission::{Admission, AdmissionError, GatePermit};
pub use email::{InviteMessage, Mailer, RecordingMailer, SmtpMailer};
pub use error::ServiceError;
pub use invite::{Activation, InviteIssued, InviteService, NewAdmin, NewUser};
pub use jwt::{AuthError, IssuedToken, SessionClaims, TokenCodec};
