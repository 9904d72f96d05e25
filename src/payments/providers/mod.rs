pub mod airpay;
pub mod airpay_token;
pub mod payu;
pub mod sabpaisa;

pub use airpay::{AirpayAdapter, AirpayConfig};
pub use airpay_token::{AccessTokenSource, AirpayTokenClient};
pub use payu::{PayuAdapter, PayuConfig};
pub use sabpaisa::{SabpaisaAdapter, SabpaisaConfig};
