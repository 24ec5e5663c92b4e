use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::modules::coupons::Coupon;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    #[default]
    Pending,
    Processing,
    Shipped,
    Delivered,
    Cancelled,
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Shipped => "shipped",
            Self::Delivered => "delivered",
            Self::Cancelled => "cancelled",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentMethod {
    Cod,
    Card,
    Upi,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderItem {
    pub product_id: String,
    pub quantity: u32,
    /// Unit price at the time of purchase.
    #[serde(with = "rust_decimal::serde::str")]
    pub price: Decimal,
}

impl OrderItem {
    pub fn subtotal(&self) -> Decimal {
        self.price * Decimal::from(self.quantity)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ShippingDetails {
    pub full_name: String,
    pub address: String,
    pub city: String,
    pub pin_code: String,
    pub phone: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub customer_id: String,
    pub shipping: ShippingDetails,
    pub status: OrderStatus,
    pub items: Vec<OrderItem>,
    /// Before discounts.
    #[serde(with = "rust_decimal::serde::str")]
    pub total_price: Decimal,
    pub coupon: Option<Coupon>,
    #[serde(with = "rust_decimal::serde::str")]
    pub discount_amount: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub final_price: Decimal,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    /// Builds a pending order priced from its items.
    pub fn new(
        customer_id: impl Into<String>,
        shipping: ShippingDetails,
        items: Vec<OrderItem>,
        coupon: Option<Coupon>,
        now: DateTime<Utc>,
    ) -> Self {
        let mut order = Self {
            customer_id: customer_id.into(),
            shipping,
            status: OrderStatus::Pending,
            items,
            total_price: Decimal::ZERO,
            coupon,
            discount_amount: Decimal::ZERO,
            final_price: Decimal::ZERO,
            created_at: now,
            updated_at: now,
        };
        order.total_price = order.items_total();
        order.recompute(now);
        order
    }

    pub fn items_total(&self) -> Decimal {
        self.items.iter().map(OrderItem::subtotal).sum()
    }

    /// Re-derives `discount_amount` and `final_price` from `total_price` and
    /// the coupon. Call before every save.
    pub fn recompute(&mut self, now: DateTime<Utc>) {
        match &self.coupon {
            Some(coupon) if coupon.is_valid_at(now, Some(self.total_price)) => {
                let discounted = coupon.apply_discount_at(now, self.total_price);
                self.discount_amount = self.total_price - discounted;
                self.final_price = discounted;
            }
            _ => {
                self.discount_amount = Decimal::ZERO;
                self.final_price = self.total_price;
            }
        }
        self.updated_at = now;
    }

    pub fn apply_coupon(&mut self, coupon: Option<Coupon>, now: DateTime<Utc>) {
        self.coupon = coupon;
        self.recompute(now);
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Payment {
    pub method: PaymentMethod,
    #[serde(with = "rust_decimal::serde::str")]
    pub amount: Decimal,
    pub transaction_id: Option<String>,
    pub paid_at: DateTime<Utc>,
}

impl Payment {
    /// A payment for the order's final price.
    pub fn for_order(order: &Order, method: PaymentMethod, transaction_id: Option<String>, now: DateTime<Utc>) -> Self {
        Self {
            method,
            amount: order.final_price,
            transaction_id,
            paid_at: now,
        }
    }
}
