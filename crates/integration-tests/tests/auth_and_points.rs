//! Integration tests for sign-in state and loyalty points.

#![allow(clippy::unwrap_used)]

use qr_table_client::auth::AuthError;
use qr_table_client::{ClientError, PageEvent};
use qr_table_core::PaymentMode;
use qr_table_integration_tests::{LIVE_TIMEOUT, TABLE_05_URL, TestContext};

#[tokio::test]
async fn test_sign_up_populates_session() {
    let ctx = TestContext::new().await;
    let mut page = ctx.mount(TABLE_05_URL).await;
    assert!(page.session().user().is_none());

    page.sign_up("diner@example.com", "hunter22").await.unwrap();

    let user = page.session().user().unwrap();
    assert_eq!(user.email.as_ref().unwrap().as_str(), "diner@example.com");
    assert_eq!(user.points, Some(0));
    assert!(page.render_account().unwrap().contains("diner@example.com"));
}

#[tokio::test]
async fn test_bad_credentials_surface_to_page() {
    let ctx = TestContext::new().await;
    let mut page = ctx.mount(TABLE_05_URL).await;
    page.sign_up("diner@example.com", "hunter22").await.unwrap();
    page.sign_out().await.unwrap();

    let result = page.sign_in("diner@example.com", "wrong-password").await;
    assert!(matches!(
        result,
        Err(ClientError::Auth(AuthError::InvalidCredentials))
    ));
    assert_eq!(page.last_error(), Some("Invalid credentials"));
    assert!(page.session().user().is_none());
}

#[tokio::test]
async fn test_duplicate_account_rejected() {
    let ctx = TestContext::new().await;
    let mut page = ctx.mount(TABLE_05_URL).await;
    page.sign_up("diner@example.com", "hunter22").await.unwrap();

    let result = page.sign_up("diner@example.com", "hunter22").await;
    assert!(matches!(
        result,
        Err(ClientError::Auth(AuthError::UserAlreadyExists))
    ));
}

#[tokio::test]
async fn test_sign_out_clears_user() {
    let ctx = TestContext::new().await;
    let mut page = ctx.mount(TABLE_05_URL).await;
    page.sign_up("diner@example.com", "hunter22").await.unwrap();

    page.sign_out().await.unwrap();
    assert!(page.session().user().is_none());
    assert!(ctx.backend.auth().current_user().is_none());
}

#[tokio::test]
async fn test_signed_in_order_earns_points() {
    let ctx = TestContext::new().await;
    let mut page = ctx.mount(TABLE_05_URL).await;
    page.sign_up("diner@example.com", "hunter22").await.unwrap();

    page.add_item("masala-dosa", 2).unwrap();
    page.add_item("idli", 1).unwrap();
    page.select_payment(PaymentMode::Card);
    let order_id = page.submit_order().await.unwrap();

    // 240 + 60.50 earns one point per whole unit.
    assert_eq!(page.session().user().unwrap().points, Some(300));
    let order = ctx.backend.orders().get_order(&order_id).await.unwrap();
    assert_eq!(order.uid.as_ref(), Some(&page.session().user().unwrap().uid));
}

#[tokio::test]
async fn test_points_restored_on_sign_in() {
    let ctx = TestContext::new().await;
    let mut page = ctx.mount(TABLE_05_URL).await;
    page.sign_up("diner@example.com", "hunter22").await.unwrap();
    page.add_item("masala-dosa", 1).unwrap();
    page.select_payment(PaymentMode::Cash);
    page.submit_order().await.unwrap();
    page.sign_out().await.unwrap();

    page.sign_in("diner@example.com", "hunter22").await.unwrap();
    assert_eq!(page.session().user().unwrap().points, Some(120));
}

#[tokio::test]
async fn test_other_page_sees_sign_in() {
    let ctx = TestContext::new().await;
    let mut watcher = ctx.mount(TABLE_05_URL).await;
    let mut actor = ctx.mount(TABLE_05_URL).await;

    actor.sign_up("diner@example.com", "hunter22").await.unwrap();

    let wait = async {
        loop {
            if watcher.next_event().await == PageEvent::AuthChanged {
                break;
            }
        }
    };
    tokio::time::timeout(LIVE_TIMEOUT, wait).await.unwrap();

    let user = watcher.session().user().unwrap();
    assert_eq!(user.email.as_ref().unwrap().as_str(), "diner@example.com");
    assert_eq!(user.points, Some(0));
}

#[tokio::test]
async fn test_page_mounted_after_sign_in_starts_signed_in() {
    let ctx = TestContext::new().await;
    ctx.backend
        .auth()
        .sign_up("diner@example.com", "hunter22")
        .await
        .unwrap();

    let page = ctx.mount(TABLE_05_URL).await;
    assert!(page.session().user().is_some());
}
