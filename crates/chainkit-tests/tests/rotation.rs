//! Provider rotation as seen through a chain adapter.

use chainkit_core::{ChainError, NetworkError};
use chainkit_tests::helpers::*;
use chainkit_wallet::ChainAdapter;

fn timeout() -> Result<(), ChainError> {
    Err(NetworkError::Timeout.into())
}

fn bad_gateway() -> Result<(), ChainError> {
    Err(NetworkError::Http { status: 502, body: "bad gateway".into() }.into())
}

const HOSTS: [&str; 3] = ["https://a.example", "https://b.example", "https://c.example"];

#[tokio::test]
async fn fail_fail_success_reaches_third_backend() {
    let (manager, _) = bitcoin_manager(&HOSTS, |b| b);
    let providers = manager.adapter().providers();
    providers.providers()[0].set_fallback(timeout());
    providers.providers()[1].set_fallback(bad_gateway());

    let hash = manager.adapter().submit(&[0x01, 0x02]).await.unwrap();
    assert_eq!(hash, format!("{:064x}", 1));
    let attempts: Vec<usize> = providers.providers().iter().map(|p| p.attempts()).collect();
    assert_eq!(attempts, vec![1, 1, 1]);
    assert_eq!(manager.current_host(), "https://c.example");
    assert_eq!(providers.providers()[2].broadcasts.lock().as_slice(), ["0102"]);
}

#[tokio::test]
async fn all_failing_returns_last_error_after_two_rotations() {
    let (manager, _) = bitcoin_manager(&HOSTS, |b| b);
    let providers = manager.adapter().providers();
    providers.providers()[0].set_fallback(timeout());
    providers.providers()[1].set_fallback(timeout());
    providers.providers()[2].set_fallback(bad_gateway());

    let err = manager.adapter().submit(&[0x01]).await.unwrap_err();
    assert_eq!(err, bad_gateway().unwrap_err());
    assert_eq!(providers.current_index(), 2);
    let attempts: usize = providers.providers().iter().map(|p| p.attempts()).sum();
    assert_eq!(attempts, 3);
}

#[tokio::test]
async fn later_requests_stay_on_the_working_backend() {
    let (manager, _) = bitcoin_manager(&HOSTS, |b| b);
    let providers = manager.adapter().providers();
    providers.providers()[0].set_fallback(timeout());

    manager.adapter().submit(&[0x01]).await.unwrap();
    manager.adapter().submit(&[0x02]).await.unwrap();
    assert_eq!(providers.providers()[0].attempts(), 1);
    assert_eq!(providers.providers()[1].attempts(), 2);
    assert_eq!(providers.providers()[2].attempts(), 0);
}

#[tokio::test]
async fn rotation_wraps_around() {
    let (manager, _) = bitcoin_manager(&HOSTS, |b| b);
    let providers = manager.adapter().providers();
    providers.providers()[0].set_fallback(timeout());
    manager.adapter().submit(&[0x01]).await.unwrap();
    assert_eq!(providers.current_index(), 1);

    providers.providers()[0].set_fallback(Ok(()));
    providers.providers()[1].set_fallback(timeout());
    providers.providers()[2].set_fallback(timeout());
    manager.adapter().submit(&[0x02]).await.unwrap();
    assert_eq!(providers.current_index(), 0);
}

#[tokio::test]
async fn refresh_rotates_past_a_dead_backend() {
    let (mut manager, _) = bitcoin_manager(&HOSTS[..2], |b| b);
    manager.adapter().providers().providers()[0].set_fallback(timeout());

    manager.update().await.unwrap();
    assert_eq!(manager.current_host(), "https://b.example");
    assert_eq!(manager.wallet().funds_available(&chainkit_core::AmountType::Coin), 65_000);
}
