use crate::error::{PaymentError, Result};
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::Value;
use std::str::FromStr;

#[derive(Debug, Deserialize)]
pub struct CallbackEnvelope {
    #[serde(rename = "Body")]
    pub body: CallbackBody,
}

#[derive(Debug, Deserialize)]
pub struct CallbackBody {
    #[serde(rename = "stkCallback")]
    pub stk_callback: StkCallback,
}

#[derive(Debug, Deserialize)]
pub struct StkCallback {
    #[serde(rename = "MerchantRequestID")]
    pub merchant_request_id: String,
    #[serde(rename = "CheckoutRequestID")]
    pub checkout_request_id: String,
    #[serde(rename = "ResultCode")]
    pub result_code: i64,
    #[serde(rename = "ResultDesc", default)]
    pub result_desc: String,
    #[serde(rename = "CallbackMetadata")]
    pub callback_metadata: Option<CallbackMetadata>,
}

#[derive(Debug, Deserialize)]
pub struct CallbackMetadata {
    #[serde(rename = "Item", default)]
    pub item: Vec<CallbackItem>,
}

#[derive(Debug, Deserialize)]
pub struct CallbackItem {
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "Value", default)]
    pub value: Value,
}

/// The flattened outcome of one STK push, however it reached us.
#[derive(Debug, Clone, PartialEq)]
pub struct CallbackResult {
    pub merchant_request_id: String,
    pub checkout_request_id: String,
    pub result_code: i64,
    pub result_desc: String,
    pub amount: Option<Decimal>,
    pub receipt_number: Option<String>,
    pub transaction_id: Option<String>,
    pub phone_number: Option<String>,
    pub transaction_date: Option<String>,
}

impl CallbackResult {
    /// Parses the raw JSON body the gateway posts to the callback URL.
    pub fn parse(raw: &[u8]) -> Result<Self> {
        let envelope: CallbackEnvelope = serde_json::from_slice(raw)
            .map_err(|e| PaymentError::InvalidCallback(e.to_string()))?;
        let result = Self::from(envelope.body.stk_callback);

        if result.checkout_request_id.trim().is_empty() {
            return Err(PaymentError::InvalidCallback(
                "missing CheckoutRequestID".to_string(),
            ));
        }
        // A success without a receipt cannot be recorded as Completed.
        if result.is_success() && result.receipt_number.is_none() {
            return Err(PaymentError::InvalidCallback(format!(
                "successful callback for {} carries no MpesaReceiptNumber",
                result.checkout_request_id
            )));
        }
        Ok(result)
    }

    pub fn is_success(&self) -> bool {
        self.result_code == 0
    }
}

impl From<StkCallback> for CallbackResult {
    fn from(callback: StkCallback) -> Self {
        let mut result = CallbackResult {
            merchant_request_id: callback.merchant_request_id,
            checkout_request_id: callback.checkout_request_id,
            result_code: callback.result_code,
            result_desc: callback.result_desc,
            amount: None,
            receipt_number: None,
            transaction_id: None,
            phone_number: None,
            transaction_date: None,
        };

        let items = callback
            .callback_metadata
            .map(|metadata| metadata.item)
            .unwrap_or_default();
        for item in items {
            match item.name.as_str() {
                "Amount" => result.amount = value_as_decimal(&item.value),
                "MpesaReceiptNumber" => result.receipt_number = value_as_string(&item.value),
                "TransactionID" => result.transaction_id = value_as_string(&item.value),
                "PhoneNumber" => result.phone_number = value_as_string(&item.value),
                "TransactionDate" => result.transaction_date = value_as_string(&item.value),
                _ => {}
            }
        }
        result
    }
}

fn value_as_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn value_as_decimal(value: &Value) -> Option<Decimal> {
    match value {
        Value::Number(n) => Decimal::from_str(&n.to_string()).ok(),
        Value::String(s) => Decimal::from_str(s).ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    const SUCCESS: &str = r#"{
        "Body": {
            "stkCallback": {
                "MerchantRequestID": "29115-34620561-1",
                "CheckoutRequestID": "ws_CO_191220191020363925",
                "ResultCode": 0,
                "ResultDesc": "The service request is processed successfully.",
                "CallbackMetadata": {
                    "Item": [
                        {"Name": "Amount", "Value": 60.00},
                        {"Name": "MpesaReceiptNumber", "Value": "QAB1X2Y3"},
                        {"Name": "TransactionID", "Value": "TXN998877"},
                        {"Name": "Balance"},
                        {"Name": "TransactionDate", "Value": 20191219102115},
                        {"Name": "PhoneNumber", "Value": 254712345678}
                    ]
                }
            }
        }
    }"#;

    #[test]
    fn test_parse_success_metadata() {
        let result = CallbackResult::parse(SUCCESS.as_bytes()).unwrap();
        assert!(result.is_success());
        assert_eq!(result.checkout_request_id, "ws_CO_191220191020363925");
        assert_eq!(result.amount, Some(dec!(60)));
        assert_eq!(result.receipt_number.as_deref(), Some("QAB1X2Y3"));
        assert_eq!(result.transaction_id.as_deref(), Some("TXN998877"));
        assert_eq!(result.phone_number.as_deref(), Some("254712345678"));
        assert_eq!(result.transaction_date.as_deref(), Some("20191219102115"));
    }

    #[test]
    fn test_parse_failure_without_metadata() {
        let raw = r#"{"Body":{"stkCallback":{
            "MerchantRequestID":"1","CheckoutRequestID":"ws_CO_1",
            "ResultCode":1032,"ResultDesc":"Request cancelled by user"}}}"#;
        let result = CallbackResult::parse(raw.as_bytes()).unwrap();
        assert!(!result.is_success());
        assert_eq!(result.result_code, 1032);
        assert_eq!(result.receipt_number, None);
    }

    #[test]
    fn test_success_without_receipt_is_rejected() {
        let raw = r#"{"Body":{"stkCallback":{
            "MerchantRequestID":"1","CheckoutRequestID":"ws_CO_1",
            "ResultCode":0,"ResultDesc":"ok",
            "CallbackMetadata":{"Item":[{"Name":"Amount","Value":10}]}}}}"#;
        assert!(matches!(
            CallbackResult::parse(raw.as_bytes()),
            Err(PaymentError::InvalidCallback(_))
        ));
    }

    #[test]
    fn test_malformed_envelope() {
        assert!(matches!(
            CallbackResult::parse(b"{\"stkCallback\":{}}"),
            Err(PaymentError::InvalidCallback(_))
        ));
        assert!(CallbackResult::parse(b"not json").is_err());
    }
}
