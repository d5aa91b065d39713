use alloy_primitives::B256;
use serde_json::{json, Value};
use tempfile::NamedTempFile;

use memopark_core::{ids, CaseState, Decision, GovObjectId, GovScope, PinState};
use memopark_indexer::mapper::Mapper;
use memopark_indexer::source::{Block, ChainEvent};
use memopark_indexer::storage::{
    ActionLog, ArbitrationCase, GovCase, Grave, Listing, Order, PinOverview, ReferralCode, Storage,
};
use memopark_indexer::{AppendConflict, ReorgDetected};

async fn setup_storage() -> (Storage, NamedTempFile) {
    let temp_db = NamedTempFile::new().unwrap();
    let storage = Storage::new_with_path(temp_db.path(), None, None)
        .await
        .unwrap();
    storage.run_migrations().await.unwrap();
    (storage, temp_db)
}

fn hash(height: u64) -> B256 {
    B256::left_padding_from(&height.to_be_bytes())
}

fn ev(index: u32, module: &str, name: &str, args: Value) -> ChainEvent {
    ChainEvent {
        module: module.to_string(),
        name: name.to_string(),
        args,
        extrinsic_hash: None,
        index_in_block: index,
    }
}

fn block(height: u64, events: Vec<ChainEvent>) -> Block {
    Block {
        height,
        hash: Some(hash(height)),
        parent_hash: height.checked_sub(1).map(hash),
        events,
    }
}

fn listing_created(index: u32, id: u64) -> ChainEvent {
    ev(
        index,
        "otc_listing",
        "ListingCreated",
        json!({
            "id": id, "maker": "A", "side": "Sell", "base": 0, "quote": 1,
            "price": "100", "min_qty": 1, "max_qty": 1000,
            "total": 1000, "remaining": 1000, "partial": true, "expire_at": 50000
        }),
    )
}

/// Forget the checkpoint without touching projected rows.
async fn rewind_checkpoint(storage: &Storage) {
    sqlx::query("UPDATE sync_state SET last_block_number = NULL, last_block_hash = NULL WHERE id = 1")
        .execute(storage.pool())
        .await
        .unwrap();
}

async fn table_counts(storage: &Storage) -> Vec<u64> {
    let mut counts = Vec::new();
    for table in [
        "listings",
        "listing_actions",
        "orders",
        "order_actions",
        "arbitration_cases",
        "arbitration_actions",
        "arb_daily_stats",
        "gov_cases",
        "gov_actions",
        "graves",
        "grave_actions",
        "offerings",
        "pin_overviews",
        "pin_billing_events",
        "referral_links",
        "referral_codes",
        "notifications",
    ] {
        counts.push(storage.count(table).await.unwrap());
    }
    counts
}

#[tokio::test]
async fn test_listing_created_then_canceled() {
    let (storage, _temp_db) = setup_storage().await;
    let mapper = Mapper::new(14_400).unwrap();

    mapper
        .apply_block(&storage, &block(100, vec![listing_created(0, 7)]))
        .await
        .unwrap();

    let listing = storage.find::<Listing>("7").await.unwrap().unwrap();
    assert!(listing.active);
    assert_eq!(listing.remaining, 1000);
    assert!(listing.partial);
    assert_eq!(listing.expire_at, 50_000);

    let cancel = ev(0, "otc_listing", "ListingCanceled", json!({"id": 7}));
    mapper
        .apply_block(&storage, &block(250, vec![cancel]))
        .await
        .unwrap();

    let listing = storage.find::<Listing>("7").await.unwrap().unwrap();
    assert!(!listing.active);
    assert_eq!(listing.remaining, 1000);
    assert_eq!(listing.created_block, 100);
    assert_eq!(listing.updated_block, 250);

    let actions = storage.actions_for(ActionLog::Listing, "7").await.unwrap();
    let ids: Vec<&str> = actions.iter().map(|a| a.id.as_str()).collect();
    let blocks: Vec<u64> = actions.iter().map(|a| a.block).collect();
    assert_eq!(ids, vec!["7-Created-100", "7-Canceled-250"]);
    assert_eq!(blocks, vec![100, 250]);

    let feed = storage.notifications_for("7").await.unwrap();
    assert_eq!(feed.len(), 2);
    assert_eq!(feed[0].id, "N-100-0");
    assert_eq!(feed[0].module, "otc_listing");
    assert_eq!(feed[0].kind, "ListingCreated");
    assert_eq!(feed[0].actor.as_deref(), Some("A"));
}

#[tokio::test]
async fn test_listing_matches_drain_remaining() {
    let (storage, _temp_db) = setup_storage().await;
    let mapper = Mapper::new(14_400).unwrap();

    mapper
        .apply_block(
            &storage,
            &block(
                10,
                vec![
                    listing_created(0, 3),
                    ev(1, "otc_listing", "ListingMatched", json!({"id": 3, "qty": 400})),
                    ev(2, "otc_listing", "ListingMatched", json!({"id": 3, "qty": 600})),
                ],
            ),
        )
        .await
        .unwrap();

    let listing = storage.find::<Listing>("3").await.unwrap().unwrap();
    assert_eq!(listing.remaining, 0);
    assert!(!listing.active);

    let actions = storage.actions_for(ActionLog::Listing, "3").await.unwrap();
    assert_eq!(actions.len(), 3);
    assert!(actions.iter().any(|a| a.id == "3-Matched-10-1"));
    assert!(actions.iter().any(|a| a.id == "3-Matched-10-2"));
}

#[tokio::test]
async fn test_action_history_follows_event_order() {
    let (storage, _temp_db) = setup_storage().await;
    let mapper = Mapper::new(14_400).unwrap();

    let cancel = ev(1, "otc_listing", "ListingCanceled", json!({"id": 7}));
    mapper
        .apply_block(&storage, &block(5, vec![listing_created(0, 7), cancel]))
        .await
        .unwrap();

    let kinds: Vec<String> = storage
        .actions_for(ActionLog::Listing, "7")
        .await
        .unwrap()
        .into_iter()
        .map(|a| a.kind)
        .collect();
    assert_eq!(kinds, vec!["Created", "Canceled"]);

    let mut events = vec![listing_created(0, 8)];
    for index in 1..=12 {
        events.push(ev(index, "otc_listing", "ListingMatched", json!({"id": 8, "qty": 10})));
    }
    mapper.apply_block(&storage, &block(6, events)).await.unwrap();

    let actions = storage.actions_for(ActionLog::Listing, "8").await.unwrap();
    let ids: Vec<&str> = actions.iter().map(|a| a.id.as_str()).collect();
    let mut expected = vec!["8-Created-6".to_string()];
    expected.extend((1..=12).map(|index| format!("8-Matched-6-{}", index)));
    assert_eq!(ids, expected);

    let positions: Vec<u32> = actions.iter().map(|a| a.index_in_block).collect();
    assert_eq!(positions, (0..=12).collect::<Vec<u32>>());

    let listing = storage.find::<Listing>("8").await.unwrap().unwrap();
    assert_eq!(listing.remaining, 880);
}

#[tokio::test]
async fn test_order_lifecycle() {
    let (storage, _temp_db) = setup_storage().await;
    let mapper = Mapper::new(14_400).unwrap();

    let opened = ev(
        0,
        "OtcOrder",
        "OrderOpened",
        json!({
            "id": 11, "listing_id": 7, "maker": "A", "taker": "B",
            "price": 100, "qty": 5, "amount": 500, "created_at": 20, "expire_at": 80
        }),
    );
    mapper.apply_block(&storage, &block(20, vec![opened])).await.unwrap();
    mapper
        .apply_block(
            &storage,
            &block(
                21,
                vec![
                    ev(0, "otc_order", "PaymentRevealed", json!({"id": 11})),
                    ev(1, "otc_order", "OrderPaidCommitted", json!({"id": 11})),
                ],
            ),
        )
        .await
        .unwrap();
    mapper
        .apply_block(
            &storage,
            &block(22, vec![ev(0, "", "OtcOrder.OrderReleased", json!([11]))]),
        )
        .await
        .unwrap();

    let order = storage.find::<Order>("11").await.unwrap().unwrap();
    assert_eq!(order.state, memopark_core::OrderState::Released);
    assert_eq!(order.taker, "B");
    assert_eq!(order.amount, 500);
    assert_eq!(order.updated_block, 22);

    let kinds: Vec<String> = storage
        .actions_for(ActionLog::Order, "11")
        .await
        .unwrap()
        .into_iter()
        .map(|a| a.kind)
        .collect();
    assert_eq!(kinds, vec!["Opened", "PaymentRevealed", "PaidCommitted", "Released"]);
}

#[tokio::test]
async fn test_replaying_a_block_changes_nothing() {
    let (storage, _temp_db) = setup_storage().await;
    let mapper = Mapper::new(100).unwrap();

    let busy = block(
        50,
        vec![
            listing_created(0, 1),
            ev(1, "otc_listing", "ListingMatched", json!({"id": 1, "qty": 10})),
            ev(2, "arbitration", "Disputed", json!({"domain": "otc", "id": 1})),
            ev(3, "arbitration", "Arbitrated", json!({"domain": "otc", "id": 1, "decision": 0})),
            ev(4, "memo_grave", "GraveCreated", json!({"id": 9, "owner": "G"})),
            ev(5, "memo_offerings", "OfferingCommitted", json!({"id": 1, "target": [0, 9], "who": "W", "amount": 5})),
            ev(6, "memo_content_governance", "GovEvidenceNoted", json!({"scope": 5, "key": 1, "cid": "bafy"})),
            ev(7, "memo_ipfs", "PinRequested", json!({"cid_hash": "0xab", "payer": "P", "replicas": 3, "size_bytes": 10, "price": 7})),
            ev(8, "memo_referrals", "SponsorBound", json!({"who": "X", "sponsor": "Y"})),
        ],
    );

    let first = mapper.apply_block(&storage, &busy).await.unwrap();
    assert_eq!(first.applied, 9);
    let counts = table_counts(&storage).await;
    let listing = storage.find::<Listing>("1").await.unwrap();
    let grave = storage.find::<Grave>("9").await.unwrap();
    let day = storage.daily_stats(0).await.unwrap();

    // Delivered again above the checkpoint: skipped outright.
    let again = mapper.apply_block(&storage, &busy).await.unwrap();
    assert!(again.already_applied);
    assert_eq!(again.applied, 0);

    // Forced past the checkpoint: every write dedupes.
    rewind_checkpoint(&storage).await;
    let forced = mapper.apply_block(&storage, &busy).await.unwrap();
    assert!(!forced.already_applied);

    assert_eq!(table_counts(&storage).await, counts);
    assert_eq!(storage.find::<Listing>("1").await.unwrap(), listing);
    assert_eq!(storage.find::<Grave>("9").await.unwrap(), grave);
    assert_eq!(storage.daily_stats(0).await.unwrap(), day);
    assert_eq!(grave.map(|g| g.offerings_count), Some(1));
}

#[tokio::test]
async fn test_events_apply_in_block_index_order() {
    // Delivered out of order; index_in_block decides.
    let created_first = vec![
        ev(1, "otc_listing", "ListingCanceled", json!({"id": 7})),
        listing_created(0, 7),
    ];
    let canceled_first = vec![
        listing_created(1, 7),
        ev(0, "otc_listing", "ListingCanceled", json!({"id": 7})),
    ];

    let mut outcomes = Vec::new();
    for events in [created_first, canceled_first] {
        let (storage, _temp_db) = setup_storage().await;
        let mapper = Mapper::new(14_400).unwrap();
        mapper.apply_block(&storage, &block(5, events)).await.unwrap();
        let listing = storage.find::<Listing>("7").await.unwrap().unwrap();
        outcomes.push(listing.active);
    }

    assert_eq!(outcomes, vec![false, true]);
}

#[tokio::test]
async fn test_daily_rollup_counts_disputes_and_decisions() {
    let (storage, _temp_db) = setup_storage().await;
    let mapper = Mapper::new(100).unwrap();

    // N = 3 disputes, M = 3 decisions (k = 2 released), all on day 0.
    let mut height = 10;
    for id in 1..=3u64 {
        let disputed = ev(0, "arbitration", "Disputed", json!({"domain": "0x6f7463", "id": id}));
        mapper.apply_block(&storage, &block(height, vec![disputed])).await.unwrap();
        height += 1;
    }
    for (id, decision) in [(1u64, 0u64), (2, 0), (3, 1)] {
        let arbitrated = ev(
            0,
            "arbitration",
            "Arbitrated",
            json!({"domain": "0x6f7463", "id": id, "decision": decision}),
        );
        mapper.apply_block(&storage, &block(height, vec![arbitrated])).await.unwrap();
        height += 1;
    }

    let stat = storage.daily_stats(0).await.unwrap().unwrap();
    assert_eq!(stat.disputes, 3);
    assert_eq!(stat.arbitrated, 3);
    assert_eq!(stat.release, 2);
    assert_eq!(stat.refund, 1);
    assert_eq!(stat.partial, 0);

    let case = storage
        .find::<ArbitrationCase>(&ids::case_id("6f7463", 3))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(case.state, CaseState::Closed);
    assert_eq!(case.opened_at, 12);
    assert_eq!(case.closed_at, Some(15));
    assert_eq!(case.decision, Some(Decision::Refund));
}

#[tokio::test]
async fn test_decisions_by_name_and_enum_object() {
    let (storage, _temp_db) = setup_storage().await;
    let mapper = Mapper::new(100).unwrap();

    let report = mapper
        .apply_block(
            &storage,
            &block(
                40,
                vec![
                    ev(0, "arbitration", "Disputed", json!({"domain": "otc", "id": 1})),
                    ev(1, "arbitration", "Arbitrated", json!({"domain": "otc", "id": 1, "decision": "Refund"})),
                    ev(
                        2,
                        "arbitration",
                        "Arbitrated",
                        json!({"domain": "otc", "id": 2, "decision": {"__kind": "Release"}}),
                    ),
                ],
            ),
        )
        .await
        .unwrap();
    assert_eq!(report.applied, 3);
    assert_eq!(report.skipped, 0);

    let stat = storage.daily_stats(0).await.unwrap().unwrap();
    assert_eq!(stat.disputes, 1);
    assert_eq!(stat.arbitrated, 2);
    assert_eq!(stat.release, 1);
    assert_eq!(stat.refund, 1);
    assert_eq!(stat.partial, 0);
    assert_eq!(stat.updated_block, 40);

    let refunded = storage
        .find::<ArbitrationCase>(&ids::case_id("6f7463", 1))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(refunded.state, CaseState::Closed);
    assert_eq!(refunded.decision, Some(Decision::Refund));

    let released = storage
        .find::<ArbitrationCase>(&ids::case_id("6f7463", 2))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(released.decision, Some(Decision::Release));
    assert_eq!(released.opened_at, 40);
}

#[tokio::test]
async fn test_case_closes_once() {
    let (storage, _temp_db) = setup_storage().await;
    let mapper = Mapper::new(100).unwrap();

    // No dispute seen: the decision opens the case lazily.
    let first = ev(0, "arbitration", "Arbitrated", json!({"domain": "otc", "id": 4, "decision": 2, "bps": 2500}));
    let second = ev(0, "arbitration", "Arbitrated", json!({"domain": "otc", "id": 4, "decision": 1}));
    mapper.apply_block(&storage, &block(30, vec![first])).await.unwrap();
    mapper.apply_block(&storage, &block(31, vec![second])).await.unwrap();

    let case_id = ids::case_id("6f7463", 4);
    let case = storage.find::<ArbitrationCase>(&case_id).await.unwrap().unwrap();
    assert_eq!(case.opened_at, 30);
    assert_eq!(case.closed_at, Some(30));
    assert_eq!(case.decision, Some(Decision::Partial));
    assert_eq!(case.bps, Some(2500));

    let history = storage.actions_for(ActionLog::Arbitration, &case_id).await.unwrap();
    assert_eq!(history.len(), 2);
}

#[tokio::test]
async fn test_gov_case_opens_once() {
    let (storage, _temp_db) = setup_storage().await;
    let mapper = Mapper::new(14_400).unwrap();

    let note = |cid: &str| {
        ev(
            0,
            "memo_content_governance",
            "GovEvidenceNoted",
            json!({"scope": 5, "key": 9, "cid": cid}),
        )
    };
    mapper.apply_block(&storage, &block(10, vec![note("bafy-1")])).await.unwrap();
    mapper.apply_block(&storage, &block(20, vec![note("bafy-2")])).await.unwrap();

    assert_eq!(storage.count("gov_cases").await.unwrap(), 1);

    let object = GovObjectId::new(GovScope::Evidence, 9).unwrap();
    let case_id = ids::gov_case_id("memo_content_governance", &object);
    let case = storage.find::<GovCase>(&case_id).await.unwrap().unwrap();
    assert_eq!(case.object, object);
    assert_eq!(case.opened_at, 10);
    assert_eq!(case.last_action_at, 20);
    assert_eq!(case.evidence_cid.as_deref(), Some("bafy-2"));

    let history = storage.actions_for(ActionLog::Gov, &case_id).await.unwrap();
    assert_eq!(history.len(), 2);
}

#[tokio::test]
async fn test_offering_governance_scopes_stay_apart() {
    let (storage, _temp_db) = setup_storage().await;
    let mapper = Mapper::new(14_400).unwrap();

    mapper
        .apply_block(
            &storage,
            &block(
                40,
                vec![
                    ev(0, "memo_offerings", "OfferingPriceUpdated", json!({"kind_code": 2, "fixed_price": "1000"})),
                    ev(1, "memo_offerings", "PausedByDomainSet", json!({"domain": 2, "paused": true})),
                    ev(2, "memo_offerings", "PausedGlobalSet", json!({"paused": false})),
                    ev(3, "memo_offerings", "OfferParamsUpdated", json!({})),
                ],
            ),
        )
        .await
        .unwrap();

    assert_eq!(storage.count("gov_cases").await.unwrap(), 4);
    let history = storage.price_history(2).await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].id, "2-40");
    assert_eq!(history[0].fixed_price, Some(1000));
    assert_eq!(history[0].unit_price_per_week, None);
}

#[tokio::test]
async fn test_grave_offerings_and_feed() {
    let (storage, _temp_db) = setup_storage().await;
    let mapper = Mapper::new(14_400).unwrap();

    mapper
        .apply_block(
            &storage,
            &block(
                5,
                vec![
                    ev(0, "memo_grave", "GraveCreated", json!({"id": 42, "owner": "alice", "park_id": 1, "kind": 0})),
                    ev(1, "memo_grave", "Interred", json!({"id": 42, "deceased_id": 77})),
                    ev(2, "memo_offerings", "OfferingCommitted", json!({"id": 1, "target": [0, 42], "who": "bob", "amount": "250"})),
                    ev(3, "memo_offerings", "OfferingCommitted", json!({"id": 2, "target": [1, 42], "who": "bob", "amount": "999"})),
                    ev(4, "memo_offerings", "OfferingCommitted", json!({"id": 3, "target": {"domain": 0, "id": 42}, "who": "carol"})),
                    ev(5, "grave_guestbook", "MessagePosted", json!({"arg0": 42, "arg1": 1, "arg2": "carol"})),
                ],
            ),
        )
        .await
        .unwrap();
    mapper
        .apply_block(
            &storage,
            &block(6, vec![ev(0, "memo_grave", "GraveTransferred", json!({"id": 42, "new_owner": "dave"}))]),
        )
        .await
        .unwrap();

    let grave = storage.find::<Grave>("42").await.unwrap().unwrap();
    assert_eq!(grave.owner, "dave");
    assert_eq!(grave.primary_deceased_id, Some(77));
    assert_eq!(grave.offerings_count, 2);
    assert_eq!(grave.offerings_amount, 250);
    assert_eq!(storage.count("offerings").await.unwrap(), 3);

    // Linking a deceased emits no notification.
    let feed = storage.notifications_in_range(5, 6).await.unwrap();
    let ids: Vec<&str> = feed.iter().map(|n| n.id.as_str()).collect();
    assert_eq!(ids, vec!["N-5-0", "N-5-2", "N-5-3", "N-5-4", "N-5-5", "N-6-0"]);
    assert_eq!(feed[4].meta.as_deref(), Some(r#"{"graveId":42}"#));
}

#[tokio::test]
async fn test_grave_counters_start_at_creation() {
    let (storage, _temp_db) = setup_storage().await;
    let mapper = Mapper::new(14_400).unwrap();

    let offering = |id: u64| {
        ev(0, "memo_offerings", "OfferingCommitted", json!({"id": id, "target": [0, 8], "who": "bob", "amount": 40}))
    };
    let created = ev(0, "memo_grave", "GraveCreated", json!({"id": 8, "owner": "alice"}));

    mapper.apply_block(&storage, &block(1, vec![offering(1)])).await.unwrap();
    mapper.apply_block(&storage, &block(2, vec![created.clone()])).await.unwrap();

    let grave = storage.find::<Grave>("8").await.unwrap().unwrap();
    assert_eq!(grave.offerings_count, 0);
    assert_eq!(grave.offerings_amount, 0);
    assert_eq!(storage.count("offerings").await.unwrap(), 1);

    mapper.apply_block(&storage, &block(3, vec![offering(2)])).await.unwrap();
    mapper.apply_block(&storage, &block(4, vec![created])).await.unwrap();

    let grave = storage.find::<Grave>("8").await.unwrap().unwrap();
    assert_eq!(grave.offerings_count, 1);
    assert_eq!(grave.offerings_amount, 40);
    assert_eq!(grave.updated_block, 4);
}

#[tokio::test]
async fn test_referral_code_keeps_first_claim() {
    let (storage, _temp_db) = setup_storage().await;
    let mapper = Mapper::new(14_400).unwrap();

    let claim = |who: &str| ev(0, "memo_referrals", "CodeClaimed", json!({"who": who, "code": "MEMO"}));
    mapper.apply_block(&storage, &block(1, vec![claim("a")])).await.unwrap();
    mapper.apply_block(&storage, &block(2, vec![claim("b")])).await.unwrap();

    let code = storage.find::<ReferralCode>("MEMO").await.unwrap().unwrap();
    assert_eq!(code.owner, "b");
    assert_eq!(code.claimed_at, 1);
    assert_eq!(code.updated_block, 2);
}

#[tokio::test]
async fn test_pin_billing_lifecycle() {
    let (storage, _temp_db) = setup_storage().await;
    let mapper = Mapper::new(14_400).unwrap();

    let steps = [
        ev(0, "memo_ipfs", "PinRequested", json!({"cid_hash": "0xABCD", "payer": "P", "replicas": 3, "size_bytes": 2048, "price": 10})),
        ev(0, "memo_ipfs", "PinMarkedPinned", json!({"cid_hash": "0xabcd", "replicas": 2})),
        ev(0, "memo_ipfs", "PinCharged", json!({"cid_hash": "0xabcd", "amount": 50, "next_charge_at": 200})),
        ev(0, "memo_ipfs", "PinGrace", json!({"cid_hash": "0xabcd", "next_charge_at": 300})),
        ev(0, "memo_ipfs", "PinCharged", json!({"cid_hash": "0xabcd", "amount": 50, "next_charge_at": 400})),
        // Not allowed from Active; recorded but state kept.
        ev(0, "memo_ipfs", "PinExpired", json!({"cid_hash": "0xabcd"})),
    ];
    for (offset, step) in steps.into_iter().enumerate() {
        mapper
            .apply_block(&storage, &block(100 + offset as u64, vec![step]))
            .await
            .unwrap();
    }

    let pin = storage.find::<PinOverview>("0xabcd").await.unwrap().unwrap();
    assert_eq!(pin.last_state, PinState::Active);
    assert_eq!(pin.total_charged, 100);
    assert_eq!(pin.replicas, 2);
    assert_eq!(pin.size_bytes, 2048);
    assert_eq!(pin.owner.as_deref(), Some("P"));
    assert_eq!(pin.first_seen, 100);
    assert_eq!(pin.last_next_charge_at, Some(400));

    let kinds: Vec<String> = storage
        .billing_events_for("0xabcd")
        .await
        .unwrap()
        .into_iter()
        .map(|e| e.kind)
        .collect();
    assert_eq!(kinds, vec!["Requested", "Pinned", "Charged", "Grace", "Charged", "Expired"]);

    mapper
        .apply_block(&storage, &block(110, vec![ev(0, "memo_ipfs", "PinGrace", json!({"cid_hash": "0xabcd"}))]))
        .await
        .unwrap();
    mapper
        .apply_block(&storage, &block(111, vec![ev(0, "memo_ipfs", "PinExpired", json!({"cid_hash": "0xabcd"}))]))
        .await
        .unwrap();

    let pin = storage.find::<PinOverview>("0xabcd").await.unwrap().unwrap();
    assert_eq!(pin.last_state, PinState::Expired);
    assert_eq!(pin.last_next_charge_at, Some(400));
}

#[tokio::test]
async fn test_malformed_event_is_skipped() {
    let (storage, _temp_db) = setup_storage().await;
    let mapper = Mapper::new(14_400).unwrap();

    let report = mapper
        .apply_block(
            &storage,
            &block(
                8,
                vec![
                    listing_created(0, 1),
                    ev(1, "otc_listing", "ListingCanceled", json!({})),
                    ev(2, "arbitration", "Arbitrated", json!({"domain": "otc", "id": 1, "decision": 9})),
                    listing_created(3, 2),
                ],
            ),
        )
        .await
        .unwrap();

    assert_eq!(report.applied, 2);
    assert_eq!(report.skipped, 2);
    assert_eq!(storage.count("listings").await.unwrap(), 2);
    assert_eq!(storage.get_sync_state().await.unwrap().last_block_number, Some(8));

    let record = storage.get_block(8).await.unwrap().unwrap();
    assert_eq!(record.event_count, 4);
    assert_eq!(record.skipped, 2);
}

#[tokio::test]
async fn test_unknown_events_are_noops() {
    let (storage, _temp_db) = setup_storage().await;
    let mapper = Mapper::new(14_400).unwrap();

    let report = mapper
        .apply_block(
            &storage,
            &block(
                3,
                vec![
                    ev(0, "balances", "Transfer", json!({"from": "a", "to": "b", "amount": 1})),
                    ev(1, "otc_listing", "ListingRepriced", json!({"id": 1})),
                ],
            ),
        )
        .await
        .unwrap();

    assert_eq!(report.ignored, 2);
    assert_eq!(report.applied, 0);
    assert!(table_counts(&storage).await.iter().all(|&c| c == 0));
    assert_eq!(storage.get_sync_state().await.unwrap().last_block_number, Some(3));
}

#[tokio::test]
async fn test_append_conflict_rolls_back_block() {
    let (storage, _temp_db) = setup_storage().await;
    let mapper = Mapper::new(14_400).unwrap();

    let offering = |amount: u64| {
        ev(0, "memo_offerings", "OfferingCommitted", json!({"id": 5, "target": [1, 1], "who": "w", "amount": amount}))
    };
    mapper.apply_block(&storage, &block(10, vec![offering(10)])).await.unwrap();

    rewind_checkpoint(&storage).await;
    let err = mapper
        .apply_block(&storage, &block(11, vec![listing_created(0, 99), {
            let mut conflicting = offering(20);
            conflicting.index_in_block = 1;
            conflicting
        }]))
        .await
        .unwrap_err();

    let conflict = err.downcast_ref::<AppendConflict>().unwrap();
    assert_eq!(conflict.table, "offerings");
    assert_eq!(conflict.id, "5");

    assert!(storage.find::<Listing>("99").await.unwrap().is_none());
    assert_eq!(storage.get_sync_state().await.unwrap().last_block_number, None);
    assert!(storage.get_block(11).await.unwrap().is_none());
}

#[tokio::test]
async fn test_reorg_is_detected() {
    let (storage, _temp_db) = setup_storage().await;
    let mapper = Mapper::new(14_400).unwrap();

    mapper.apply_block(&storage, &block(1, vec![])).await.unwrap();

    let mut forked = block(2, vec![listing_created(0, 1)]);
    forked.parent_hash = Some(B256::repeat_byte(0xee));
    let err = mapper.apply_block(&storage, &forked).await.unwrap_err();

    let reorg = err.downcast_ref::<ReorgDetected>().unwrap();
    assert_eq!(reorg.height, 2);
    assert_eq!(reorg.stored_hash, hash(1));
    assert_eq!(storage.get_sync_state().await.unwrap().last_block_number, Some(1));
    assert!(storage.find::<Listing>("1").await.unwrap().is_none());

    // The canonical child still applies.
    mapper
        .apply_block(&storage, &block(2, vec![listing_created(0, 1)]))
        .await
        .unwrap();
    assert!(storage.find::<Listing>("1").await.unwrap().is_some());
}

#[tokio::test]
async fn test_reset_allows_reindex() {
    let (storage, _temp_db) = setup_storage().await;
    let mapper = Mapper::new(14_400).unwrap();

    let blocks = [block(1, vec![listing_created(0, 1)]), block(2, vec![])];
    for b in &blocks {
        mapper.apply_block(&storage, b).await.unwrap();
    }
    let before = table_counts(&storage).await;

    storage.reset().await.unwrap();
    assert!(table_counts(&storage).await.iter().all(|&c| c == 0));

    for b in &blocks {
        mapper.apply_block(&storage, b).await.unwrap();
    }
    assert_eq!(table_counts(&storage).await, before);
}
