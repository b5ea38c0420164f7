pub mod event;
pub mod gateway;
pub mod signature;

pub use event::{
    Charge, CheckoutSession, Expandable, LineItem, LineItemList, PaymentEvent, Refund, WebhookEvent,
};
pub use gateway::{PaymentGateway, StripeClient};
pub use signature::{SignatureError, WebhookVerifier, SIGNATURE_HEADER};
