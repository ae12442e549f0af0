//! Fixed table of gateway response and result codes with the wording support
//! staff can read back to a merchant.

const CODES: &[(&str, &str)] = &[
    ("0", "Success"),
    ("1", "The customer's M-Pesa balance is insufficient for this payment"),
    ("17", "The customer's M-Pesa account has reached a transaction limit"),
    ("26", "The gateway is handling too many requests, try again shortly"),
    (
        "1001",
        "Another M-Pesa transaction is already in progress for this phone number",
    ),
    ("1019", "The payment request expired before the customer responded"),
    ("1025", "The payment prompt could not be delivered to the phone"),
    ("1032", "The customer cancelled the payment request"),
    ("1037", "The customer's phone could not be reached"),
    ("2001", "The customer entered an incorrect M-Pesa PIN"),
    ("9999", "The payment prompt could not be delivered to the phone"),
    ("400.002.02", "The gateway rejected the request as invalid"),
    ("400.002.05", "The gateway rejected the request as invalid"),
    ("404.001.01", "The gateway could not find the requested resource"),
    ("404.001.03", "The gateway access token is invalid"),
    ("404.001.04", "The gateway rejected the request headers"),
    (
        "500.001.1001",
        "Another M-Pesa transaction is already in progress for this phone number",
    ),
    ("500.002.1001", "The gateway reported an internal error"),
    ("500.003.02", "The gateway is busy, try again shortly"),
    ("500.003.03", "The gateway quota has been exceeded, try again later"),
    ("500.003.1001", "The gateway reported an internal error"),
];

/// Codes the gateway uses to say "this token is not valid".
const AUTH_CODES: &[&str] = &["404.001.03", "404.001.04"];

pub fn describe(code: &str) -> Option<&'static str> {
    CODES
        .iter()
        .find(|(known, _)| *known == code.trim())
        .map(|(_, message)| *message)
}

/// The table entry for `code`, or `fallback` when the code is unknown.
pub fn readable_reason(code: &str, fallback: &str) -> String {
    match describe(code) {
        Some(message) => message.to_string(),
        None if fallback.trim().is_empty() => format!("Gateway returned code {}", code),
        None => fallback.to_string(),
    }
}

pub fn is_auth_code(code: &str) -> bool {
    AUTH_CODES.contains(&code.trim())
}
