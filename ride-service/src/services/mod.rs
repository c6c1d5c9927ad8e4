pub mod fare;
pub mod metrics;
pub mod rate;
pub mod razorpay;
pub mod repository;
pub mod routing;
pub mod settlement;
pub mod store;

pub use fare::FareService;
pub use metrics::{get_metrics, init_metrics};
pub use razorpay::RazorpayClient;
pub use repository::{MongoBookingStore, MongoPaymentStore, MongoVehicleStore};
pub use routing::RouteResolver;
pub use settlement::{PaymentCallback, SettlementOrchestrator, SettlementResult};
pub use store::{
    BookingStore, InMemoryBookingStore, InMemoryPaymentStore, InMemoryVehicleStore, PaymentStore,
    VehicleStore,
};
