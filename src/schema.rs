use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// One balance fact as returned by the ledger service.
///
/// `id` is the only stable identity; every other field may be edited upstream or be
/// missing entirely, so most of them are optional.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerRow {
    pub id: i64,

    #[serde(default)]
    pub account_name: Option<String>,

    #[serde(default)]
    pub classification: Option<String>,

    #[serde(rename = "partner_id_name", default)]
    pub partner_name: Option<String>,

    #[serde(rename = "Store", default)]
    pub store: Option<String>,

    /// Non-numeric or null balances from the service are read as zero.
    #[serde(
        rename = "Balance",
        default,
        deserialize_with = "lenient::decimal_or_zero"
    )]
    pub balance: Decimal,

    /// Absent when the service sends something that is not a number.
    #[serde(rename = "Year", default, deserialize_with = "lenient::optional_i32")]
    pub year: Option<i32>,

    #[serde(rename = "Month", default, deserialize_with = "lenient::optional_u32")]
    pub month: Option<u32>,

    #[serde(rename = "MonthName", default)]
    pub month_name: Option<String>,

    #[serde(rename = "FinancialYearMonth", default)]
    pub financial_year_month: Option<String>,

    #[serde(default)]
    pub last_modified_at: Option<String>,

    #[serde(default)]
    pub last_modified_user: Option<String>,
}

impl LedgerRow {
    pub fn new(id: i64, balance: Decimal) -> Self {
        Self {
            id,
            account_name: None,
            classification: None,
            partner_name: None,
            store: None,
            balance,
            year: None,
            month: None,
            month_name: None,
            financial_year_month: None,
            last_modified_at: None,
            last_modified_user: None,
        }
    }

    pub fn with_classification(mut self, classification: impl Into<String>) -> Self {
        self.classification = Some(classification.into());
        self
    }

    pub fn with_account(mut self, account_name: impl Into<String>) -> Self {
        self.account_name = Some(account_name.into());
        self
    }

    pub fn with_partner(mut self, partner_name: impl Into<String>) -> Self {
        self.partner_name = Some(partner_name.into());
        self
    }

    pub fn with_store(mut self, store: impl Into<String>) -> Self {
        self.store = Some(store.into());
        self
    }

    pub fn with_period(mut self, year: i32, month: u32, month_name: impl Into<String>) -> Self {
        self.year = Some(year);
        self.month = Some(month);
        self.month_name = Some(month_name.into());
        self
    }
}

pub(crate) mod lenient {
    use rust_decimal::prelude::FromPrimitive;
    use rust_decimal::Decimal;
    use serde::{Deserialize, Deserializer};
    use serde_json::Value;
    use std::str::FromStr;

    pub fn decimal_or_zero<'de, D>(deserializer: D) -> Result<Decimal, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Option::<Value>::deserialize(deserializer)?;
        Ok(value
            .as_ref()
            .and_then(decimal_from_value)
            .unwrap_or(Decimal::ZERO))
    }

    pub fn optional_i32<'de, D>(deserializer: D) -> Result<Option<i32>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Option::<Value>::deserialize(deserializer)?;
        Ok(value
            .as_ref()
            .and_then(integer_from_value)
            .and_then(|n| i32::try_from(n).ok()))
    }

    pub fn optional_u32<'de, D>(deserializer: D) -> Result<Option<u32>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Option::<Value>::deserialize(deserializer)?;
        Ok(value
            .as_ref()
            .and_then(integer_from_value)
            .and_then(|n| u32::try_from(n).ok()))
    }

    fn decimal_from_value(value: &Value) -> Option<Decimal> {
        match value {
            Value::Number(n) => match n.as_i64() {
                Some(i) => Some(Decimal::from(i)),
                None => n.as_f64().and_then(Decimal::from_f64),
            },
            Value::String(s) => {
                let trimmed = s.trim();
                Decimal::from_str(trimmed)
                    .or_else(|_| Decimal::from_scientific(trimmed))
                    .ok()
            }
            _ => None,
        }
    }

    // "2024", 2024 and 2024.0 all count; 2024.5 does not.
    fn integer_from_value(value: &Value) -> Option<i64> {
        match value {
            Value::Number(n) => n.as_i64().or_else(|| {
                n.as_f64()
                    .filter(|f| f.is_finite() && f.fract() == 0.0)
                    .map(|f| f as i64)
            }),
            Value::String(s) => {
                let trimmed = s.trim();
                trimmed.parse::<i64>().ok().or_else(|| {
                    trimmed
                        .parse::<f64>()
                        .ok()
                        .filter(|f| f.is_finite() && f.fract() == 0.0)
                        .map(|f| f as i64)
                })
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_deserialize_service_row() {
        let json = r#"{
            "id": 17,
            "account_name": "Sales",
            "classification": "Income",
            "partner_id_name": "Acme Traders",
            "Store": "Pune",
            "Balance": 1250.75,
            "Year": 2024,
            "MonthName": "Jan",
            "Month": 1,
            "FinancialYearMonth": "2023-10",
            "last_modified_at": null,
            "last_modified_user": null
        }"#;

        let row: LedgerRow = serde_json::from_str(json).unwrap();

        assert_eq!(row.id, 17);
        assert_eq!(row.account_name.as_deref(), Some("Sales"));
        assert_eq!(row.partner_name.as_deref(), Some("Acme Traders"));
        assert_eq!(row.store.as_deref(), Some("Pune"));
        assert_eq!(row.balance, dec!(1250.75));
        assert_eq!(row.year, Some(2024));
        assert_eq!(row.month, Some(1));
        assert!(row.last_modified_at.is_none());
    }

    #[test]
    fn test_lenient_numeric_fields() {
        let json = r#"{
            "id": 3,
            "Balance": "not a number",
            "Year": "2023",
            "Month": "abc"
        }"#;

        let row: LedgerRow = serde_json::from_str(json).unwrap();

        assert_eq!(row.balance, Decimal::ZERO);
        assert_eq!(row.year, Some(2023));
        assert_eq!(row.month, None);
        assert!(row.classification.is_none());
    }

    #[test]
    fn test_null_balance_and_float_year() {
        let json = r#"{ "id": 4, "Balance": null, "Year": 2024.0, "Month": 12.5 }"#;

        let row: LedgerRow = serde_json::from_str(json).unwrap();

        assert_eq!(row.balance, Decimal::ZERO);
        assert_eq!(row.year, Some(2024));
        assert_eq!(row.month, None);
    }

    #[test]
    fn test_string_balance_keeps_precision() {
        let json = r#"{ "id": 5, "Balance": " 1000.10 " }"#;

        let row: LedgerRow = serde_json::from_str(json).unwrap();

        assert_eq!(row.balance, dec!(1000.10));
    }
}
