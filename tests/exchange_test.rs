mod common;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use common::{
    StalledRates, balance_of, code, default_rates, faulty_service, funded_account, test_service,
    test_service_with_rates,
};
use rust_decimal::Decimal;
use valuta::application::{ErrorKind, LedgerError};
use valuta::domain::MutationKind;

#[tokio::test]
async fn test_exchange_moves_money_at_rate() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let account = funded_account(&service, &[("USD", 10_000)]).await?;

    let receipt = service
        .exchange(account, &code("USD"), &code("EUR"), 100)
        .await?;

    assert_eq!(receipt.rate, Decimal::new(90, 2));
    assert_eq!(receipt.withdrawn, 100);
    assert_eq!(receipt.deposited, 90);
    assert_eq!(receipt.debit.delta, -100);
    assert_eq!(receipt.credit.delta, 90);
    assert_eq!(balance_of(&service, account, "USD").await?, 9_900);
    assert_eq!(balance_of(&service, account, "EUR").await?, 90);

    // Both legs are journaled under one operation
    let legs = service.operation(receipt.operation_id).await?;
    let kinds: Vec<MutationKind> = legs.iter().map(|m| m.kind).collect();
    assert_eq!(kinds, [MutationKind::ExchangeDebit, MutationKind::ExchangeCredit]);

    Ok(())
}

#[tokio::test]
async fn test_exchange_rounds_down_to_minor_units() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let account = funded_account(&service, &[("EUR", 1_000)]).await?;

    // 333 * 1.10 = 366.3
    let receipt = service
        .exchange(account, &code("EUR"), &code("USD"), 333)
        .await?;

    assert_eq!(receipt.deposited, 366);
    assert_eq!(balance_of(&service, account, "EUR").await?, 667);
    assert_eq!(balance_of(&service, account, "USD").await?, 366);

    Ok(())
}

#[tokio::test]
async fn test_missing_rate_leaves_balances_untouched() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let account = funded_account(&service, &[("EUR", 5_000)]).await?;

    let err = service
        .exchange(account, &code("EUR"), &code("RUB"), 1_000)
        .await
        .unwrap_err();

    assert!(matches!(err, LedgerError::RateUnavailable { .. }));
    assert!(err.is_retryable());
    assert_eq!(balance_of(&service, account, "EUR").await?, 5_000);
    assert_eq!(balance_of(&service, account, "RUB").await?, 0);
    assert_eq!(service.history(account, None).await?.len(), 1);

    Ok(())
}

#[tokio::test]
async fn test_stalled_rate_source_times_out() -> Result<()> {
    let (service, _temp) = test_service_with_rates(Arc::new(StalledRates)).await?;
    let account = funded_account(&service, &[("USD", 5_000)]).await?;

    let started = std::time::Instant::now();
    let err = service
        .exchange(account, &code("USD"), &code("EUR"), 1_000)
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::RateUnavailable);
    assert!(started.elapsed() < Duration::from_secs(5));
    assert_eq!(balance_of(&service, account, "USD").await?, 5_000);

    Ok(())
}

#[tokio::test]
async fn test_exchange_with_insufficient_funds() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let account = funded_account(&service, &[("USD", 50)]).await?;

    let err = service
        .exchange(account, &code("USD"), &code("EUR"), 100)
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::InsufficientFunds);
    assert_eq!(balance_of(&service, account, "USD").await?, 50);
    assert_eq!(balance_of(&service, account, "EUR").await?, 0);

    Ok(())
}

#[tokio::test]
async fn test_invalid_exchange_arguments() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let account = funded_account(&service, &[("USD", 1_000)]).await?;
    let usd = code("USD");
    let eur = code("EUR");

    let err = service.exchange(account, &usd, &usd, 100).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);

    for amount in [0, -100] {
        let err = service.exchange(account, &usd, &eur, amount).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    }

    let err = service
        .exchange(account, &usd, &code("GBP"), 100)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);

    assert_eq!(balance_of(&service, account, "USD").await?, 1_000);

    Ok(())
}

#[tokio::test]
async fn test_amount_worth_less_than_one_unit_is_rejected() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let account = funded_account(&service, &[("RUB", 1_000)]).await?;

    // 50 * 0.0108 = 0.54, which floors to zero
    let err = service
        .exchange(account, &code("RUB"), &code("USD"), 50)
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    assert_eq!(balance_of(&service, account, "RUB").await?, 1_000);

    Ok(())
}

#[tokio::test]
async fn test_failed_credit_is_compensated() -> Result<()> {
    let (service, faulty, _temp) = faulty_service().await?;
    let account = funded_account(&service, &[("USD", 1_000)]).await?;
    faulty.fail(MutationKind::ExchangeCredit, 1);

    let err = service
        .exchange(account, &code("USD"), &code("EUR"), 400)
        .await
        .unwrap_err();

    // The caller sees why the credit failed, not a partial failure
    assert_eq!(err.kind(), ErrorKind::TransientUnavailable);
    assert_eq!(balance_of(&service, account, "USD").await?, 1_000);
    assert_eq!(balance_of(&service, account, "EUR").await?, 0);
    assert_eq!(faulty.calls(MutationKind::Compensation), 1);

    let history = service.history(account, None).await?;
    assert_eq!(history[0].kind, MutationKind::Compensation);
    assert_eq!(history[0].delta, 400);
    assert_eq!(history[1].kind, MutationKind::ExchangeDebit);
    assert_eq!(history[0].operation_id, history[1].operation_id);

    Ok(())
}

#[tokio::test]
async fn test_compensation_retries_transient_failures() -> Result<()> {
    let (service, faulty, _temp) = faulty_service().await?;
    let account = funded_account(&service, &[("USD", 1_000)]).await?;
    faulty.fail(MutationKind::ExchangeCredit, 1);
    faulty.fail(MutationKind::Compensation, 1);

    let err = service
        .exchange(account, &code("USD"), &code("EUR"), 400)
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::TransientUnavailable);
    assert_eq!(faulty.calls(MutationKind::Compensation), 2);
    assert_eq!(balance_of(&service, account, "USD").await?, 1_000);

    Ok(())
}

#[tokio::test]
async fn test_failed_compensation_reports_partial_failure() -> Result<()> {
    let (service, faulty, _temp) = faulty_service().await?;
    let account = funded_account(&service, &[("USD", 1_000)]).await?;
    faulty.fail(MutationKind::ExchangeCredit, 1);
    faulty.fail(MutationKind::Compensation, 10);

    let err = service
        .exchange(account, &code("USD"), &code("EUR"), 400)
        .await
        .unwrap_err();

    let report = match err {
        LedgerError::PartialFailure(report) => report,
        other => panic!("expected PartialFailure, got {other:?}"),
    };
    assert_eq!(report.account, account);
    assert_eq!(report.from_currency, code("USD"));
    assert_eq!(report.to_currency, code("EUR"));
    assert_eq!(report.withdrawn, 400);
    assert_eq!(report.deposit_amount, 360);
    assert_eq!(report.compensation_attempts, 3);
    assert_eq!(faulty.calls(MutationKind::Compensation), 3);

    // The debit stands and is traceable from the report
    assert_eq!(balance_of(&service, account, "USD").await?, 600);
    let legs = service.operation(report.operation_id).await?;
    assert_eq!(legs.len(), 1);
    assert_eq!(legs[0].id, report.debit_mutation);

    Ok(())
}

#[tokio::test]
async fn test_uncertain_refund_commit_is_not_retried() -> Result<()> {
    let (service, faulty, _temp) = faulty_service().await?;
    let account = funded_account(&service, &[("USD", 1_000)]).await?;
    faulty.fail(MutationKind::ExchangeCredit, 1);
    faulty.fail_after_commit(MutationKind::Compensation, 1);

    let err = service
        .exchange(account, &code("USD"), &code("EUR"), 400)
        .await
        .unwrap_err();

    let report = match err {
        LedgerError::PartialFailure(report) => report,
        other => panic!("expected PartialFailure, got {other:?}"),
    };
    assert_eq!(report.compensation_attempts, 1);
    assert_eq!(faulty.calls(MutationKind::Compensation), 1);

    // The refund landed exactly once
    assert_eq!(balance_of(&service, account, "USD").await?, 1_000);

    Ok(())
}

#[tokio::test]
async fn test_abandoned_exchange_still_settles() -> Result<()> {
    let (service, faulty, _temp) = faulty_service().await?;
    let account = funded_account(&service, &[("USD", 1_000)]).await?;
    faulty.delay(MutationKind::ExchangeCredit, Duration::from_millis(300));

    let abandoned = tokio::time::timeout(
        Duration::from_millis(100),
        service.exchange(account, &code("USD"), &code("EUR"), 100),
    )
    .await;
    assert!(abandoned.is_err(), "caller should give up before the credit");

    // The debit committed before the caller went away
    assert_eq!(balance_of(&service, account, "USD").await?, 900);

    let mut credited = 0;
    for _ in 0..40 {
        credited = balance_of(&service, account, "EUR").await?;
        if credited > 0 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    assert_eq!(credited, 90);
    assert_eq!(balance_of(&service, account, "USD").await?, 900);
    assert_eq!(faulty.calls(MutationKind::ExchangeCredit), 1);

    Ok(())
}

#[tokio::test]
async fn test_exchange_rates_lists_every_other_currency() -> Result<()> {
    let (service, _temp) = test_service().await?;

    let quotes = service.exchange_rates(&code("USD")).await?;

    assert_eq!(quotes.len(), 2);
    assert_eq!(quotes[0].to, code("EUR"));
    assert_eq!(quotes[0].rate, Decimal::new(90, 2));
    assert_eq!(quotes[1].to, code("RUB"));
    assert_eq!(quotes[1].rate, Decimal::new(9250, 2));

    // EUR has no RUB quote
    let err = service.exchange_rates(&code("EUR")).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::RateUnavailable);

    Ok(())
}

#[tokio::test]
async fn test_rates_come_from_configured_source() -> Result<()> {
    let rates = default_rates().with_rate(code("EUR"), code("RUB"), Decimal::new(10_000, 2));
    let (service, _temp) = test_service_with_rates(Arc::new(rates)).await?;
    let account = funded_account(&service, &[("EUR", 250)]).await?;

    let receipt = service
        .exchange(account, &code("EUR"), &code("RUB"), 250)
        .await?;

    assert_eq!(receipt.deposited, 25_000);
    assert_eq!(balance_of(&service, account, "RUB").await?, 25_000);

    Ok(())
}
