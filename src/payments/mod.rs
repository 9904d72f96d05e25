pub mod checksum;
pub mod cipher;
pub mod clock;
pub mod credentials;
pub mod error;
pub mod factory;
pub mod provider;
pub mod providers;
pub mod sanitize;
pub mod types;
pub mod utils;

pub use error::{PaymentError, PaymentResult};
pub use factory::GatewayRegistry;
pub use provider::GatewayAdapter;
pub use types::{
    CallbackPayload, CallbackResult, CallbackStatus, GatewayName, OutboundPayload, PaymentRequest,
};
