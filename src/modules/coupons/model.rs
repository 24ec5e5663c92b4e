use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiscountType {
    #[default]
    Percentage,
    Fixed,
}

impl DiscountType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Percentage => "percentage",
            Self::Fixed => "fixed",
        }
    }
}

impl FromStr for DiscountType {
    type Err = CouponError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "percentage" => Ok(Self::Percentage),
            "fixed" => Ok(Self::Fixed),
            other => Err(CouponError::UnknownDiscountType(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CouponStatus {
    Inactive,
    NotStarted,
    Expired,
    UsageLimitReached,
    Active,
}

impl fmt::Display for CouponStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Inactive => "Inactive",
            Self::NotStarted => "Not Started",
            Self::Expired => "Expired",
            Self::UsageLimitReached => "Usage Limit Reached",
            Self::Active => "Active",
        };
        f.write_str(label)
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum CouponError {
    #[error("Coupon code cannot be empty")]
    EmptyCode,

    #[error("{field} must not be negative")]
    NegativeAmount { field: &'static str },

    #[error("Coupon validity window ends before it starts")]
    InvalidWindow,

    #[error("Unknown discount type: {0}")]
    UnknownDiscountType(String),

    #[error("Coupon {code} cannot be used: {status}")]
    NotUsable { code: String, status: CouponStatus },
}

/// A discount code applied to order totals.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Coupon {
    pub code: String,
    pub discount_type: DiscountType,
    #[serde(with = "rust_decimal::serde::str")]
    pub discount_value: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub min_purchase_amount: Decimal,
    pub valid_from: DateTime<Utc>,
    pub valid_to: DateTime<Utc>,
    pub active: bool,
    /// `None` means unlimited.
    pub usage_limit: Option<u32>,
    pub used_count: u32,
}

impl Coupon {
    pub fn new(
        code: impl Into<String>,
        discount_type: DiscountType,
        discount_value: Decimal,
        valid_from: DateTime<Utc>,
        valid_to: DateTime<Utc>,
    ) -> Result<Self, CouponError> {
        let coupon = Self {
            code: code.into().trim().to_string(),
            discount_type,
            discount_value,
            min_purchase_amount: Decimal::ZERO,
            valid_from,
            valid_to,
            active: true,
            usage_limit: None,
            used_count: 0,
        };
        coupon.validate()?;
        Ok(coupon)
    }

    pub fn with_min_purchase(mut self, amount: Decimal) -> Result<Self, CouponError> {
        self.min_purchase_amount = amount;
        self.validate()?;
        Ok(self)
    }

    pub fn with_usage_limit(mut self, limit: u32) -> Self {
        self.usage_limit = Some(limit);
        self
    }

    pub fn validate(&self) -> Result<(), CouponError> {
        if self.code.is_empty() {
            return Err(CouponError::EmptyCode);
        }
        if self.discount_value < Decimal::ZERO {
            return Err(CouponError::NegativeAmount { field: "discount_value" });
        }
        if self.min_purchase_amount < Decimal::ZERO {
            return Err(CouponError::NegativeAmount { field: "min_purchase_amount" });
        }
        if self.valid_to < self.valid_from {
            return Err(CouponError::InvalidWindow);
        }
        Ok(())
    }

    /// Both ends of the validity window are inclusive.
    pub fn status_at(&self, now: DateTime<Utc>) -> CouponStatus {
        if !self.active {
            return CouponStatus::Inactive;
        }
        if self.valid_from > now {
            return CouponStatus::NotStarted;
        }
        if self.valid_to < now {
            return CouponStatus::Expired;
        }
        if self.remaining_uses() == Some(0) {
            return CouponStatus::UsageLimitReached;
        }
        CouponStatus::Active
    }

    /// Usable at `now`, and, when a total is given, meets the minimum purchase.
    pub fn is_valid_at(&self, now: DateTime<Utc>, order_total: Option<Decimal>) -> bool {
        if self.status_at(now) != CouponStatus::Active {
            return false;
        }
        match order_total {
            Some(total) => total >= self.min_purchase_amount,
            None => true,
        }
    }

    /// The discounted total, never below zero. An unusable coupon leaves the
    /// total unchanged.
    pub fn apply_discount_at(&self, now: DateTime<Utc>, total: Decimal) -> Decimal {
        if !self.is_valid_at(now, Some(total)) {
            return total;
        }

        let discount = match self.discount_type {
            DiscountType::Percentage => self.discount_value / Decimal::ONE_HUNDRED * total,
            DiscountType::Fixed => self.discount_value,
        };

        (total - discount).max(Decimal::ZERO).round_dp(2)
    }

    pub fn remaining_uses(&self) -> Option<u32> {
        self.usage_limit
            .map(|limit| limit.saturating_sub(self.used_count))
    }

    /// Records one redemption; refuses once the coupon is no longer usable.
    pub fn increment_usage(&mut self, now: DateTime<Utc>) -> Result<(), CouponError> {
        let status = self.status_at(now);
        if status != CouponStatus::Active {
            return Err(CouponError::NotUsable {
                code: self.code.clone(),
                status,
            });
        }
        self.used_count = self.used_count.saturating_add(1);
        Ok(())
    }
}

impl fmt::Display for Coupon {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.discount_type {
            DiscountType::Percentage => write!(f, "{} ({}%)", self.code, self.discount_value),
            DiscountType::Fixed => write!(f, "{} ({})", self.code, self.discount_value),
        }
    }
}
