//! End-to-end lifecycle scenarios over the in-memory store.
//!
//! The engine is exercised exactly as production wires it, with recording
//! fakes standing in for WhatsApp, the courier, and the platform client.

use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use secrecy::SecretString;

use orderloop_core::{
    CustomerReply, Event, Order, OrderId, OrderRef, OrderStatus, Phone, ReplyAction, Tenant,
    TenantId, TenantSecrets,
};
use orderloop_server::courier::{CourierError, CourierGateway};
use orderloop_server::ingest;
use orderloop_server::services::{Lifecycle, Reconciler};
use orderloop_server::shopify::{PlatformGateway, ShopifyError};
use orderloop_server::store::{MemoryStore, OrderStore};
use orderloop_server::whatsapp::{TemplateSender, TemplateSpec, WhatsAppError};

const ORDER_BODY: &str = r##"{
    "id": "1001",
    "name": "#1001",
    "customer": {"first_name": "Ali", "phone": "03001234567"},
    "total_price": "1500",
    "currency": "PKR",
    "line_items": [{"name": "Shirt", "quantity": 2}]
}"##;

// =============================================================================
// Fakes
// =============================================================================

#[derive(Default)]
struct RecordingSender {
    templates: Mutex<Vec<(String, TemplateSpec)>>,
    texts: Mutex<Vec<(String, String)>>,
    fail: AtomicBool,
}

impl RecordingSender {
    fn templates(&self) -> Vec<(String, TemplateSpec)> {
        self.templates.lock().expect("lock").clone()
    }

    fn templates_named(&self, name: &str) -> Vec<TemplateSpec> {
        self.templates()
            .into_iter()
            .filter(|(_, spec)| spec.name == name)
            .map(|(_, spec)| spec)
            .collect()
    }

    fn texts(&self) -> Vec<(String, String)> {
        self.texts.lock().expect("lock").clone()
    }
}

#[async_trait]
impl TemplateSender for RecordingSender {
    async fn send_template(&self, to: &Phone, spec: &TemplateSpec) -> Result<(), WhatsAppError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(WhatsAppError::Api("scripted send failure".into()));
        }
        self.templates
            .lock()
            .expect("lock")
            .push((to.as_str().to_owned(), spec.clone()));
        Ok(())
    }

    async fn send_text(&self, to: &Phone, body: &str) -> Result<(), WhatsAppError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(WhatsAppError::Api("scripted send failure".into()));
        }
        self.texts
            .lock()
            .expect("lock")
            .push((to.as_str().to_owned(), body.to_owned()));
        Ok(())
    }
}

struct ScriptedCourier {
    status: Mutex<Option<String>>,
    book_calls: AtomicUsize,
    fail_booking: AtomicBool,
}

impl Default for ScriptedCourier {
    fn default() -> Self {
        Self {
            status: Mutex::new(None),
            book_calls: AtomicUsize::new(0),
            fail_booking: AtomicBool::new(false),
        }
    }
}

impl ScriptedCourier {
    fn set_status(&self, status: &str) {
        *self.status.lock().expect("lock") = Some(status.to_owned());
    }
}

#[async_trait]
impl CourierGateway for ScriptedCourier {
    async fn book(
        &self,
        _order: &Order,
        _api_key: &SecretString,
    ) -> Result<orderloop_core::TrackingNumber, CourierError> {
        self.book_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_booking.load(Ordering::SeqCst) {
            return Err(CourierError::Api {
                status: 503,
                message: "scripted booking failure".into(),
            });
        }
        Ok(orderloop_core::TrackingNumber::new("TRK1"))
    }

    async fn status(
        &self,
        _tracking: &orderloop_core::TrackingNumber,
        _api_key: &SecretString,
    ) -> Result<Option<String>, CourierError> {
        Ok(self.status.lock().expect("lock").clone())
    }
}

#[derive(Default)]
struct RecordingPlatform {
    notes: Mutex<Vec<(String, String)>>,
}

impl RecordingPlatform {
    fn notes(&self) -> Vec<(String, String)> {
        self.notes.lock().expect("lock").clone()
    }
}

#[async_trait]
impl PlatformGateway for RecordingPlatform {
    async fn update_order_note(
        &self,
        _shop_domain: &str,
        _token: &SecretString,
        order_id: &OrderId,
        note: &str,
    ) -> Result<(), ShopifyError> {
        self.notes
            .lock()
            .expect("lock")
            .push((order_id.as_str().to_owned(), note.to_owned()));
        Ok(())
    }
}

// =============================================================================
// World
// =============================================================================

struct World {
    store: Arc<MemoryStore>,
    sender: Arc<RecordingSender>,
    courier: Arc<ScriptedCourier>,
    platform: Arc<RecordingPlatform>,
    lifecycle: Arc<Lifecycle>,
}

fn world() -> World {
    let store = Arc::new(MemoryStore::new());
    let sender = Arc::new(RecordingSender::default());
    let courier = Arc::new(ScriptedCourier::default());
    let platform = Arc::new(RecordingPlatform::default());

    let lifecycle = Arc::new(Lifecycle::new(
        Arc::clone(&store) as Arc<dyn OrderStore>,
        Arc::clone(&sender) as Arc<dyn TemplateSender>,
        Arc::clone(&courier) as Arc<dyn CourierGateway>,
        Arc::clone(&platform) as Arc<dyn PlatformGateway>,
    ));

    World {
        store,
        sender,
        courier,
        platform,
        lifecycle,
    }
}

impl World {
    async fn add_tenant(&self, id: &str, auto_book: bool) -> TenantId {
        let tenant_id = TenantId::new(id);
        let tenant = Tenant {
            id: tenant_id.clone(),
            shop_domain: id.to_owned(),
            shop_name: format!("{id} Store"),
            created_at: Utc::now(),
        };
        let secrets = TenantSecrets {
            webhook_secret: SecretString::from("whsec"),
            platform_token: SecretString::from("shpat"),
            courier_api_key: SecretString::from("ck"),
            owner_phone: Phone::normalize("03009998877", "92"),
            auto_book,
            country_code: "92".to_owned(),
        };
        self.store
            .upsert_tenant(&tenant, &secrets)
            .await
            .expect("tenant upsert");
        tenant_id
    }

    async fn create_order(&self, tenant_id: &TenantId) {
        let draft = ingest::parse_order_draft(ORDER_BODY, "92").expect("draft parses");
        self.lifecycle
            .handle(Event::OrderCreated {
                tenant_id: tenant_id.clone(),
                draft,
            })
            .await
            .expect("order created");
    }

    async fn order(&self, tenant_id: &TenantId, order_id: &str) -> Order {
        self.store
            .get_order(tenant_id, &OrderId::new(order_id))
            .await
            .expect("store read")
            .expect("order exists")
    }

    fn confirm_reply(&self, tenant_id: &TenantId) -> Event {
        Event::CustomerReplied(CustomerReply {
            phone: Phone::normalize("923001234567", "92"),
            action: ReplyAction::Confirm,
            order_ref: Some(OrderRef {
                tenant_id: tenant_id.clone(),
                order_id: OrderId::new("1001"),
            }),
        })
    }
}

// =============================================================================
// Order creation
// =============================================================================

#[tokio::test]
async fn order_created_sends_confirmation_with_exact_params() {
    let w = world();
    let tenant_id = w.add_tenant("acme", false).await;
    w.create_order(&tenant_id).await;

    let order = w.order(&tenant_id, "1001").await;
    assert_eq!(order.status, OrderStatus::Pending);
    assert_eq!(
        order.customer.phone.as_ref().map(Phone::as_str),
        Some("923001234567")
    );
    assert!(order.flags.confirmation_sent);

    let sent = w.sender.templates();
    assert_eq!(sent.len(), 1);
    let (to, spec) = &sent[0];
    assert_eq!(to, "923001234567");
    assert_eq!(spec.name, "order_confirmation");
    assert_eq!(
        spec.body_params,
        vec!["Ali", "#1001", "Shirt", "2", "acme Store", "1500", "PKR"]
    );
    assert_eq!(spec.buttons[0].payload, "CONFIRM_ORDER:acme:1001");
    assert_eq!(spec.buttons[1].payload, "CANCEL_ORDER:acme:1001");
}

#[tokio::test]
async fn redelivered_order_created_does_not_duplicate_confirmation() {
    let w = world();
    let tenant_id = w.add_tenant("acme", false).await;
    w.create_order(&tenant_id).await;
    w.create_order(&tenant_id).await;

    assert_eq!(w.sender.templates_named("order_confirmation").len(), 1);
}

#[tokio::test]
async fn confirmation_send_failure_is_retried_on_redelivery() {
    let w = world();
    let tenant_id = w.add_tenant("acme", false).await;

    w.sender.fail.store(true, Ordering::SeqCst);
    w.create_order(&tenant_id).await;

    let order = w.order(&tenant_id, "1001").await;
    assert!(!order.flags.confirmation_sent);
    assert!(!w.store.dead_letters().await.is_empty());

    // The platform redelivers; this time the send works.
    w.sender.fail.store(false, Ordering::SeqCst);
    w.create_order(&tenant_id).await;

    let order = w.order(&tenant_id, "1001").await;
    assert!(order.flags.confirmation_sent);
    assert_eq!(w.sender.templates_named("order_confirmation").len(), 1);
}

// =============================================================================
// Customer replies
// =============================================================================

#[tokio::test]
async fn confirm_books_courier_and_replies_once() {
    let w = world();
    let tenant_id = w.add_tenant("acme", true).await;
    w.create_order(&tenant_id).await;

    w.lifecycle
        .handle(w.confirm_reply(&tenant_id))
        .await
        .expect("confirm");

    let order = w.order(&tenant_id, "1001").await;
    assert_eq!(order.status, OrderStatus::Confirmed);
    assert!(order.timeline.confirmed_at.is_some());
    assert!(order.timeline.cancelled_at.is_none());
    assert_eq!(
        order.courier.tracking_number.as_ref().map(ToString::to_string),
        Some("TRK1".to_owned())
    );
    assert_eq!(w.courier.book_calls.load(Ordering::SeqCst), 1);

    let notes = w.platform.notes();
    assert_eq!(notes.len(), 1);
    assert!(notes[0].1.contains("confirmed"));

    assert_eq!(w.sender.templates_named("order_confirmed").len(), 1);

    // Owner got a heads-up text.
    let texts = w.sender.texts();
    assert_eq!(texts.len(), 1);
    assert_eq!(texts[0].0, "923009998877");
    assert!(texts[0].1.contains("confirmed"));
}

#[tokio::test]
async fn repeated_confirm_restates_without_new_writes() {
    let w = world();
    let tenant_id = w.add_tenant("acme", true).await;
    w.create_order(&tenant_id).await;

    w.lifecycle
        .handle(w.confirm_reply(&tenant_id))
        .await
        .expect("confirm");
    let confirmed_at = w
        .order(&tenant_id, "1001")
        .await
        .timeline
        .confirmed_at
        .expect("confirmed");

    w.lifecycle
        .handle(w.confirm_reply(&tenant_id))
        .await
        .expect("second confirm");

    let order = w.order(&tenant_id, "1001").await;
    assert_eq!(order.timeline.confirmed_at, Some(confirmed_at));
    assert_eq!(w.courier.book_calls.load(Ordering::SeqCst), 1);
    assert_eq!(w.sender.templates_named("order_confirmed").len(), 1);
    assert_eq!(w.sender.templates_named("order_status").len(), 1);
    assert_eq!(w.platform.notes().len(), 1);
}

#[tokio::test]
async fn cancel_replies_and_never_books() {
    let w = world();
    let tenant_id = w.add_tenant("acme", true).await;
    w.create_order(&tenant_id).await;

    w.lifecycle
        .handle(Event::CustomerReplied(CustomerReply {
            phone: Phone::normalize("923001234567", "92"),
            action: ReplyAction::Cancel,
            order_ref: Some(OrderRef {
                tenant_id: tenant_id.clone(),
                order_id: OrderId::new("1001"),
            }),
        }))
        .await
        .expect("cancel");

    let order = w.order(&tenant_id, "1001").await;
    assert_eq!(order.status, OrderStatus::Cancelled);
    assert!(order.timeline.cancelled_at.is_some());
    assert!(order.timeline.confirmed_at.is_none());
    assert!(order.courier.tracking_number.is_none());
    assert_eq!(w.courier.book_calls.load(Ordering::SeqCst), 0);
    assert_eq!(w.sender.templates_named("order_cancelled").len(), 1);
    assert!(w.platform.notes()[0].1.contains("cancelled"));
}

#[tokio::test]
async fn booking_failure_leaves_order_confirmed_and_dead_letters() {
    let w = world();
    let tenant_id = w.add_tenant("acme", true).await;
    w.create_order(&tenant_id).await;

    w.courier.fail_booking.store(true, Ordering::SeqCst);
    w.lifecycle
        .handle(w.confirm_reply(&tenant_id))
        .await
        .expect("confirm");

    let order = w.order(&tenant_id, "1001").await;
    assert_eq!(order.status, OrderStatus::Confirmed);
    assert!(order.courier.tracking_number.is_none());

    // The booking failure was recorded but the customer reply still went out.
    let letters = w.store.dead_letters().await;
    assert!(letters.iter().any(|l| l.effect == "courier_book"));
    assert_eq!(w.sender.templates_named("order_confirmed").len(), 1);
}

#[tokio::test]
async fn fallback_matches_most_recent_conversation_across_tenants() {
    let w = world();
    let acme = w.add_tenant("acme", false).await;
    let globex = w.add_tenant("globex", false).await;

    // Same customer phone, one order per tenant.
    w.create_order(&acme).await;
    let draft = ingest::parse_order_draft(
        &ORDER_BODY.replace("1001", "2002"),
        "92",
    )
    .expect("draft parses");
    w.lifecycle
        .handle(Event::OrderCreated {
            tenant_id: globex.clone(),
            draft,
        })
        .await
        .expect("second order");

    // Messaging acme's order again makes it the most recent conversation.
    w.store
        .touch_last_msg_sent(
            &acme,
            &OrderId::new("1001"),
            Utc::now() + chrono::Duration::minutes(10),
        )
        .await
        .expect("touch");

    // Free-form confirm without any embedded order reference.
    w.lifecycle
        .handle(Event::CustomerReplied(CustomerReply {
            phone: Phone::normalize("03001234567", "92"),
            action: ReplyAction::Confirm,
            order_ref: None,
        }))
        .await
        .expect("fallback confirm");

    assert_eq!(w.order(&acme, "1001").await.status, OrderStatus::Confirmed);
    assert_eq!(w.order(&globex, "2002").await.status, OrderStatus::Pending);
}

#[tokio::test]
async fn free_text_on_pending_order_sends_help_not_state_change() {
    let w = world();
    let tenant_id = w.add_tenant("acme", false).await;
    w.create_order(&tenant_id).await;

    w.lifecycle
        .handle(Event::CustomerReplied(CustomerReply {
            phone: Phone::normalize("923001234567", "92"),
            action: ReplyAction::Unknown,
            order_ref: None,
        }))
        .await
        .expect("free text");

    let order = w.order(&tenant_id, "1001").await;
    assert_eq!(order.status, OrderStatus::Pending);
    assert!(order.timeline.last_reply_at.is_some());
    assert_eq!(w.sender.templates_named("reply_help").len(), 1);
}

#[tokio::test]
async fn reply_matching_nothing_is_dropped() {
    let w = world();
    w.add_tenant("acme", false).await;

    w.lifecycle
        .handle(Event::CustomerReplied(CustomerReply {
            phone: Phone::normalize("920000000000", "92"),
            action: ReplyAction::Confirm,
            order_ref: None,
        }))
        .await
        .expect("no-match reply");

    assert!(w.sender.templates().is_empty());
}

// =============================================================================
// Fulfillment
// =============================================================================

#[tokio::test]
async fn fulfillment_sends_shipped_once() {
    let w = world();
    let tenant_id = w.add_tenant("acme", true).await;
    w.create_order(&tenant_id).await;
    w.lifecycle
        .handle(w.confirm_reply(&tenant_id))
        .await
        .expect("confirm");

    let event = Event::FulfillmentReported {
        tenant_id: tenant_id.clone(),
        order_id: OrderId::new("1001"),
    };
    w.lifecycle.handle(event.clone()).await.expect("fulfill");
    w.lifecycle.handle(event).await.expect("refulfill");

    let order = w.order(&tenant_id, "1001").await;
    assert_eq!(order.status, OrderStatus::Fulfilled);
    assert!(order.flags.fulfilled_sent);
    assert_eq!(w.sender.templates_named("order_shipped").len(), 1);
}

#[tokio::test]
async fn fulfillment_on_cancelled_order_is_noop() {
    let w = world();
    let tenant_id = w.add_tenant("acme", false).await;
    w.create_order(&tenant_id).await;
    w.lifecycle
        .handle(Event::CustomerReplied(CustomerReply {
            phone: Phone::normalize("923001234567", "92"),
            action: ReplyAction::Cancel,
            order_ref: Some(OrderRef {
                tenant_id: tenant_id.clone(),
                order_id: OrderId::new("1001"),
            }),
        }))
        .await
        .expect("cancel");

    w.lifecycle
        .handle(Event::FulfillmentReported {
            tenant_id: tenant_id.clone(),
            order_id: OrderId::new("1001"),
        })
        .await
        .expect("fulfill after cancel");

    let order = w.order(&tenant_id, "1001").await;
    assert_eq!(order.status, OrderStatus::Cancelled);
    assert!(w.sender.templates_named("order_shipped").is_empty());
}

// =============================================================================
// Reconciliation poller
// =============================================================================

async fn confirmed_booked_world() -> (World, TenantId) {
    let w = world();
    let tenant_id = w.add_tenant("acme", true).await;
    w.create_order(&tenant_id).await;
    w.lifecycle
        .handle(w.confirm_reply(&tenant_id))
        .await
        .expect("confirm");
    (w, tenant_id)
}

fn reconciler(w: &World) -> Reconciler {
    Reconciler::new(
        Arc::clone(&w.store) as Arc<dyn OrderStore>,
        Arc::clone(&w.courier) as Arc<dyn CourierGateway>,
        Arc::clone(&w.lifecycle),
        std::time::Duration::from_secs(300),
    )
}

#[tokio::test]
async fn poller_advances_to_out_for_delivery_then_delivered() {
    let (w, tenant_id) = confirmed_booked_world().await;
    let poller = reconciler(&w);

    w.courier.set_status("Out For Delivery");
    poller.sweep().await;

    let order = w.order(&tenant_id, "1001").await;
    assert_eq!(order.status, OrderStatus::OutForDelivery);
    assert_eq!(order.courier.last_status.as_deref(), Some("Out For Delivery"));
    assert_eq!(w.sender.templates_named("order_shipped").len(), 1);

    w.courier.set_status("Delivered");
    poller.sweep().await;

    let order = w.order(&tenant_id, "1001").await;
    assert_eq!(order.status, OrderStatus::Delivered);
    assert!(order.timeline.delivered_at.is_some());
    assert_eq!(w.sender.templates_named("order_delivered").len(), 1);
}

#[tokio::test]
async fn repeated_sweeps_with_same_status_send_nothing_new() {
    let (w, tenant_id) = confirmed_booked_world().await;
    let poller = reconciler(&w);

    w.courier.set_status("Delivered");
    poller.sweep().await;
    poller.sweep().await;
    poller.sweep().await;

    let order = w.order(&tenant_id, "1001").await;
    assert_eq!(order.status, OrderStatus::Delivered);
    assert_eq!(w.sender.templates_named("order_delivered").len(), 1);
}

#[tokio::test]
async fn intermediate_courier_status_is_recorded_without_notification() {
    let (w, tenant_id) = confirmed_booked_world().await;
    let poller = reconciler(&w);
    let sends_before = w.sender.templates().len();

    w.courier.set_status("In Transit");
    poller.sweep().await;
    poller.sweep().await;

    let order = w.order(&tenant_id, "1001").await;
    assert_eq!(order.status, OrderStatus::Confirmed);
    assert_eq!(order.courier.last_status.as_deref(), Some("In Transit"));
    assert_eq!(w.sender.templates().len(), sends_before);
}

#[tokio::test]
async fn delivered_orders_drop_out_of_the_sweep() {
    let (w, tenant_id) = confirmed_booked_world().await;
    let poller = reconciler(&w);

    w.courier.set_status("Delivered");
    poller.sweep().await;

    let trackable = w.store.list_trackable(&tenant_id).await.expect("list");
    assert!(trackable.is_empty());
}

// =============================================================================
// Failure isolation
// =============================================================================

#[tokio::test]
async fn send_failures_never_block_the_state_write() {
    let w = world();
    let tenant_id = w.add_tenant("acme", true).await;
    w.create_order(&tenant_id).await;

    w.sender.fail.store(true, Ordering::SeqCst);
    w.lifecycle
        .handle(w.confirm_reply(&tenant_id))
        .await
        .expect("confirm");

    // State advanced, note recorded, booking done - only the sends failed.
    let order = w.order(&tenant_id, "1001").await;
    assert_eq!(order.status, OrderStatus::Confirmed);
    assert!(order.courier.tracking_number.is_some());
    assert_eq!(w.platform.notes().len(), 1);

    let letters = w.store.dead_letters().await;
    assert!(
        letters
            .iter()
            .any(|l| l.effect.starts_with("send_template"))
    );
    assert!(letters.iter().any(|l| l.effect == "owner_heads_up"));
}
