mod common;

use common::{PushMode, harness, request};
use mpesa_core::domain::payment::PaymentStatus;
use mpesa_core::error::PaymentError;
use rust_decimal_macros::dec;

#[tokio::test]
async fn test_accepted_push_leaves_payment_pending() {
    let h = harness();

    let initiation = h
        .engine
        .initiate(request(dec!(100), "0712345678", None))
        .await
        .unwrap();

    assert!(initiation.is_accepted());
    let payment = initiation.payment;
    assert_eq!(payment.status, PaymentStatus::Pending);
    assert_eq!(payment.phone, "254712345678");
    assert_eq!(payment.checkout_request_id.as_deref(), Some("ws_CO_1"));
    assert_eq!(payment.expires_at - payment.created_at, chrono::Duration::minutes(5));

    let stored = h.stores.payments.get(payment.id).await.unwrap().unwrap();
    assert_eq!(stored, payment);

    let pushes = h.transport.pushes();
    assert_eq!(pushes.len(), 1);
    assert_eq!(pushes[0].amount, 100);
    assert_eq!(pushes[0].phone_number, "254712345678");
    assert_eq!(pushes[0].party_a, "254712345678");
    assert_eq!(pushes[0].party_b, "174379");
    assert_eq!(pushes[0].account_reference, "shop-1");
    assert_eq!(pushes[0].transaction_desc, "Payment");
    assert_eq!(pushes[0].timestamp.len(), 14);
}

#[tokio::test]
async fn test_invalid_amounts_are_rejected_before_any_io() {
    let h = harness();

    for amount in [dec!(0), dec!(-5), dec!(200000)] {
        let result = h
            .engine
            .initiate(request(amount, "0712345678", None))
            .await;
        assert!(
            matches!(result, Err(PaymentError::InvalidAmount(_))),
            "{amount}"
        );
    }

    assert!(h.stores.payments.all().await.unwrap().is_empty());
    assert_eq!(h.transport.token_calls(), 0);
    assert_eq!(h.transport.push_calls(), 0);
}

#[tokio::test]
async fn test_invalid_phone_is_rejected_before_any_io() {
    let h = harness();

    let result = h.engine.initiate(request(dec!(100), "12345", None)).await;

    assert!(matches!(result, Err(PaymentError::InvalidPhone(_))));
    assert!(h.stores.payments.all().await.unwrap().is_empty());
    assert_eq!(h.transport.push_calls(), 0);
}

#[tokio::test]
async fn test_phone_formats_reach_the_gateway_identically() {
    let h = harness();

    for phone in ["254712345678", "+254712345678", "0712345678", "712345678"] {
        h.engine
            .initiate(request(dec!(10), phone, None))
            .await
            .unwrap();
    }

    let pushes = h.transport.pushes();
    assert_eq!(pushes.len(), 4);
    assert!(pushes.iter().all(|p| p.phone_number == "254712345678"));
}

#[tokio::test]
async fn test_fractional_amount_is_sent_rounded_up() {
    let h = harness();

    let initiation = h
        .engine
        .initiate(request(dec!(99.5), "0712345678", None))
        .await
        .unwrap();

    assert_eq!(initiation.payment.amount.value(), dec!(99.5));
    assert_eq!(h.transport.pushes()[0].amount, 100);
}

#[tokio::test]
async fn test_long_reference_and_description_are_truncated_on_the_wire() {
    let h = harness();
    let mut req = request(dec!(50), "0712345678", None);
    req.account_reference = "INVOICE-2024-000123".to_string();
    req.description = "Two loaves of bread and milk".to_string();

    let initiation = h.engine.initiate(req).await.unwrap();

    let push = &h.transport.pushes()[0];
    assert_eq!(push.account_reference, "INVOICE-2024");
    assert_eq!(push.transaction_desc, "Two loaves of");
    assert_eq!(initiation.payment.account_reference, "INVOICE-2024-000123");
}

#[tokio::test]
async fn test_business_rejection_fails_payment_with_readable_reason() {
    let h = harness();
    h.transport.set_push_mode(PushMode::Business {
        code: "500.003.02".to_string(),
        message: "System is busy".to_string(),
    });

    let initiation = h
        .engine
        .initiate(request(dec!(100), "0712345678", None))
        .await
        .unwrap();

    assert!(!initiation.is_accepted());
    assert!(matches!(
        initiation.outcome,
        Err(PaymentError::GatewayBusiness { ref code, .. }) if code == "500.003.02"
    ));
    let stored = h
        .stores
        .payments
        .get(initiation.payment.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.status, PaymentStatus::Failed);
    assert_eq!(
        stored.failure_reason.as_deref(),
        Some("The gateway is busy, try again shortly")
    );
    assert!(stored.checkout_request_id.is_none());
}

#[tokio::test]
async fn test_unaccepted_response_code_fails_payment() {
    let h = harness();
    h.transport.set_push_mode(PushMode::Unaccepted {
        code: "1".to_string(),
        description: "Insufficient funds".to_string(),
    });

    let initiation = h
        .engine
        .initiate(request(dec!(100), "0712345678", None))
        .await
        .unwrap();

    assert_eq!(initiation.payment.status, PaymentStatus::Failed);
    assert_eq!(
        initiation.payment.failure_reason.as_deref(),
        Some("The customer's M-Pesa balance is insufficient for this payment")
    );
}

#[tokio::test]
async fn test_network_failure_is_recorded_not_retried() {
    let h = harness();
    h.transport.set_push_mode(PushMode::Network);

    let initiation = h
        .engine
        .initiate(request(dec!(100), "0712345678", None))
        .await
        .unwrap();

    assert!(matches!(
        initiation.outcome,
        Err(PaymentError::GatewayNetwork(_))
    ));
    assert_eq!(initiation.payment.status, PaymentStatus::Failed);
    assert!(
        initiation
            .payment
            .failure_reason
            .as_deref()
            .unwrap()
            .starts_with("Could not reach M-Pesa")
    );
    assert_eq!(h.transport.push_calls(), 1);
}

#[tokio::test]
async fn test_auth_failure_drops_the_cached_token() {
    let h = harness();
    h.transport.set_push_mode(PushMode::Auth);

    h.engine
        .initiate(request(dec!(100), "0712345678", None))
        .await
        .unwrap();
    assert_eq!(h.transport.token_calls(), 1);

    h.transport.set_push_mode(PushMode::Accept);
    let initiation = h
        .engine
        .initiate(request(dec!(100), "0712345678", None))
        .await
        .unwrap();

    assert!(initiation.is_accepted());
    assert_eq!(h.transport.token_calls(), 2);
}

#[tokio::test]
async fn test_concurrent_initiations_share_one_token() {
    let h = harness();

    let mut handles = Vec::new();
    for _ in 0..20 {
        let engine = h.engine.clone();
        handles.push(tokio::spawn(async move {
            engine
                .initiate(request(dec!(25), "0712345678", None))
                .await
        }));
    }
    for handle in handles {
        assert!(handle.await.unwrap().unwrap().is_accepted());
    }

    assert_eq!(h.transport.token_calls(), 1);
    assert_eq!(h.transport.push_calls(), 20);
    assert_eq!(h.stores.payments.all().await.unwrap().len(), 20);
}
