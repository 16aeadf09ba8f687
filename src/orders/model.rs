//! 주문 모델
//!
//! 주문(`orders`)과 주문 항목(`order_items`). 하나의 주문과 그 항목들은 같은 유닛 오브 워크에서
//! 저장되어 하나의 복제 토큰을 공유합니다.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::routing::{RoutingError, RoutingResult};

// ============================================================================
// Money - 금액
// ============================================================================

const MINOR_PER_UNIT: i64 = 100;

/// 금액 (최소 단위 정수, 소수점 둘째 자리까지)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Money(i64);

impl Money {
    pub const ZERO: Money = Money(0);

    /// 최소 단위(센트)로 생성
    pub fn from_minor(minor: i64) -> Self {
        Money(minor)
    }

    /// 최소 단위 값
    pub fn minor(&self) -> i64 {
        self.0
    }

    /// 부동소수점에서 생성 (소수점 셋째 자리에서 반올림)
    pub fn from_f64(value: f64) -> RoutingResult<Self> {
        let minor = (value * MINOR_PER_UNIT as f64).round();
        if !minor.is_finite() || minor.abs() >= i64::MAX as f64 {
            return Err(RoutingError::validation(format!("Amount out of range: {}", value)));
        }
        Ok(Money(minor as i64))
    }

    /// 수량 곱
    pub fn checked_mul(self, quantity: u32) -> Option<Money> {
        self.0.checked_mul(i64::from(quantity)).map(Money)
    }

    /// 합
    pub fn checked_add(self, other: Money) -> Option<Money> {
        self.0.checked_add(other.0).map(Money)
    }

    /// 음수 여부
    pub fn is_negative(&self) -> bool {
        self.0 < 0
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        let unit = MINOR_PER_UNIT as u64;
        write!(f, "{}{}.{:02}", sign, abs / unit, abs % unit)
    }
}

impl FromStr for Money {
    type Err = RoutingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || RoutingError::validation(format!("Invalid amount: {}", s));

        let text = s.trim();
        let (negative, digits) = match text.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, text),
        };
        let (whole, fraction) = digits.split_once('.').unwrap_or((digits, ""));

        if whole.is_empty() && fraction.is_empty() {
            return Err(invalid());
        }
        if fraction.len() > 2 {
            return Err(RoutingError::validation(format!(
                "Amount has more than 2 decimal places: {}",
                s
            )));
        }
        if !whole.chars().chain(fraction.chars()).all(|c| c.is_ascii_digit()) {
            return Err(invalid());
        }

        let whole: i64 = if whole.is_empty() { 0 } else { whole.parse().map_err(|_| invalid())? };
        let fraction: i64 = match fraction.len() {
            0 => 0,
            1 => fraction.parse::<i64>().map_err(|_| invalid())? * 10,
            _ => fraction.parse().map_err(|_| invalid())?,
        };

        let minor = whole
            .checked_mul(MINOR_PER_UNIT)
            .and_then(|m| m.checked_add(fraction))
            .ok_or_else(invalid)?;
        Ok(Money(if negative { -minor } else { minor }))
    }
}

impl Serialize for Money {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(self.0 as f64 / MINOR_PER_UNIT as f64)
    }
}

impl<'de> Deserialize<'de> for Money {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Number(f64),
            Text(String),
        }

        match Repr::deserialize(deserializer)? {
            Repr::Number(value) => Money::from_f64(value).map_err(serde::de::Error::custom),
            Repr::Text(text) => text.parse().map_err(serde::de::Error::custom),
        }
    }
}

// ============================================================================
// OrderStatus - 주문 상태
// ============================================================================

/// 주문 상태
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderStatus {
    /// 생성됨
    #[default]
    Pending,
    /// 결제됨
    Paid,
    /// 취소됨
    Cancelled,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "PENDING",
            OrderStatus::Paid => "PAID",
            OrderStatus::Cancelled => "CANCELLED",
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderStatus {
    type Err = RoutingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(OrderStatus::Pending),
            "PAID" => Ok(OrderStatus::Paid),
            "CANCELLED" => Ok(OrderStatus::Cancelled),
            _ => Err(RoutingError::type_conversion(format!("Unknown order status: {}", s))),
        }
    }
}

// ============================================================================
// OrderLine / Order
// ============================================================================

/// 주문 항목
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderLine {
    /// 항목 ID (저장 후 부여)
    pub id: Option<i64>,
    /// 소속 주문 ID (저장 후 부여)
    pub order_id: Option<i64>,
    pub product_name: String,
    pub quantity: u32,
    pub price: Money,
}

impl OrderLine {
    pub fn new(product_name: impl Into<String>, quantity: u32, price: Money) -> Self {
        Self {
            id: None,
            order_id: None,
            product_name: product_name.into(),
            quantity,
            price,
        }
    }

    /// 가격 × 수량
    pub fn subtotal(&self) -> Option<Money> {
        self.price.checked_mul(self.quantity)
    }
}

/// 주문
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    /// 주문 ID (저장 후 부여)
    pub id: Option<i64>,
    pub user_id: i64,
    pub status: OrderStatus,
    /// Σ 가격 × 수량
    pub total_amount: Money,
    /// Primary에서 부여되고 그대로 복제됨
    pub created_at: Option<DateTime<Utc>>,
    pub lines: Vec<OrderLine>,
}

impl Order {
    /// 새 주문 (`Pending`, 합계 계산)
    pub fn new(user_id: i64, lines: Vec<OrderLine>) -> RoutingResult<Self> {
        let total_amount = lines.iter().try_fold(Money::ZERO, |total, line| {
            line.subtotal()
                .and_then(|subtotal| total.checked_add(subtotal))
                .ok_or_else(|| RoutingError::validation("Order total out of range"))
        })?;

        Ok(Self {
            id: None,
            user_id,
            status: OrderStatus::Pending,
            total_amount,
            created_at: None,
            lines,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_money_parse_and_display() {
        assert_eq!("9.99".parse::<Money>().unwrap(), Money::from_minor(999));
        assert_eq!("10".parse::<Money>().unwrap(), Money::from_minor(1000));
        assert_eq!("0.5".parse::<Money>().unwrap(), Money::from_minor(50));
        assert_eq!("-1.25".parse::<Money>().unwrap(), Money::from_minor(-125));
        assert_eq!(Money::from_minor(1998).to_string(), "19.98");
        assert_eq!(Money::from_minor(-5).to_string(), "-0.05");

        assert!("1.999".parse::<Money>().is_err());
        assert!("abc".parse::<Money>().is_err());
        assert!(".".parse::<Money>().is_err());
    }

    #[test]
    fn test_money_from_f64() {
        assert_eq!(Money::from_f64(9.99).unwrap(), Money::from_minor(999));
        assert_eq!(Money::from_f64(0.1 + 0.2).unwrap(), Money::from_minor(30));
        assert!(Money::from_f64(f64::NAN).is_err());
    }

    #[test]
    fn test_money_serde() {
        let money = Money::from_minor(1998);
        assert_eq!(serde_json::to_value(money).unwrap(), serde_json::json!(19.98));
        assert_eq!(serde_json::from_str::<Money>("9.99").unwrap(), Money::from_minor(999));
        assert_eq!(serde_json::from_str::<Money>("\"9.99\"").unwrap(), Money::from_minor(999));
    }

    #[test]
    fn test_order_total() {
        let order = Order::new(
            1,
            vec![
                OrderLine::new("widget", 2, Money::from_minor(999)),
                OrderLine::new("gadget", 1, Money::from_minor(150)),
            ],
        )
        .unwrap();

        assert_eq!(order.total_amount, Money::from_minor(2148));
        assert_eq!(order.status, OrderStatus::Pending);
        assert!(order.id.is_none());
    }

    #[test]
    fn test_order_total_overflow() {
        let lines = vec![OrderLine::new("big", u32::MAX, Money::from_minor(i64::MAX / 2))];
        assert!(Order::new(1, lines).is_err());
    }

    #[test]
    fn test_order_status_roundtrip() {
        assert_eq!("PAID".parse::<OrderStatus>().unwrap(), OrderStatus::Paid);
        assert_eq!(OrderStatus::Cancelled.to_string(), "CANCELLED");
        assert!("SHIPPED".parse::<OrderStatus>().is_err());
    }
}
