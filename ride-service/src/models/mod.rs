pub mod booking;
pub mod fare;
pub mod payment;

pub use booking::{
    Booking, BookingPaymentUpdate, NewBooking, PaymentMethod, PaymentStatus, TripStatus,
};
pub use fare::{FareQuote, GeoPoint, RouteLeg, Vehicle, VehicleRate};
pub use payment::{PaymentRecord, PaymentRecordStatus};
