pub mod model;

pub use model::{Order, OrderItem, OrderStatus, Payment, PaymentMethod, ShippingDetails};
