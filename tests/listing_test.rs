//! Pagination over real listings
//!
//! Checks `ListingCursor` arithmetic against favors, requests and the
//! leaderboard stored in the in-memory backend.

mod common;

use favorr::db::schemas::FavorStatus;
use favorr::ledger::Direction;
use favorr::listing::{self, ListingCursor};
use favorr::FavorrError;

use common::{app, seed_user};

#[test]
fn test_page_position_arithmetic() {
    let second = listing::page(12, 5, 5).unwrap();
    assert_eq!(second.current_page, 2);
    assert_eq!(second.total_pages, 3);
    assert_eq!(second.total_count, 12);

    let last = listing::page(12, 5, 10).unwrap();
    assert_eq!(last.current_page, 3);

    let single = listing::page(3, 100, 0).unwrap();
    assert_eq!(single.total_pages, 1);

    assert!(matches!(
        listing::page(12, 0, 0).unwrap_err(),
        FavorrError::InvalidRange(_)
    ));
}

#[tokio::test]
async fn test_second_page_of_favors_in_creation_order() {
    let app = app().await;
    let stores = &app.state.stores;
    let alice = seed_user(stores, "alice").await;
    seed_user(stores, "bob").await;

    let mut ids = Vec::new();
    for _ in 0..12 {
        let favor = app
            .state
            .ledger
            .create_for("snack", "bob", Direction::OwedByMe, &alice)
            .await
            .unwrap();
        ids.push(favor.id);
    }

    let page = app
        .state
        .ledger
        .list_owed_by_me(&alice.user_id, ListingCursor::new(5, 5).unwrap(), None)
        .await
        .unwrap();

    assert_eq!(page.current_page, 2);
    assert_eq!(page.total_pages, 3);
    assert_eq!(page.total_count, 12);
    let got: Vec<&str> = page.items.iter().map(|f| f.id.as_str()).collect();
    let want: Vec<&str> = ids[5..10].iter().map(String::as_str).collect();
    assert_eq!(got, want);

    let tail = app
        .state
        .ledger
        .list_owed_by_me(&alice.user_id, ListingCursor::new(5, 10).unwrap(), None)
        .await
        .unwrap();
    assert_eq!(tail.items.len(), 2);

    let beyond = app
        .state
        .ledger
        .list_owed_by_me(&alice.user_id, ListingCursor::new(5, 50).unwrap(), None)
        .await
        .unwrap();
    assert!(beyond.items.is_empty());
    assert_eq!(beyond.total_count, 12);
}

#[tokio::test]
async fn test_status_filter_counts_only_matches() {
    let app = app().await;
    let stores = &app.state.stores;
    let alice = seed_user(stores, "alice").await;
    let bob = seed_user(stores, "bob").await;

    for i in 0..4 {
        let favor = app
            .state
            .ledger
            .create_for("moving_help", "bob", Direction::OwedByMe, &alice)
            .await
            .unwrap();
        if i % 2 == 0 {
            app.state
                .ledger
                .request_settlement(&favor.id, &bob, None)
                .await
                .unwrap();
        }
    }

    let settled = app
        .state
        .ledger
        .list_owed_to_me(
            &bob.user_id,
            ListingCursor::default(),
            Some(FavorStatus::Settled),
        )
        .await
        .unwrap();
    assert_eq!(settled.total_count, 2);
    assert!(settled
        .items
        .iter()
        .all(|f| f.status == FavorStatus::Settled));

    let open = app
        .state
        .ledger
        .list_owed_to_me(&bob.user_id, ListingCursor::default(), Some(FavorStatus::Created))
        .await
        .unwrap();
    assert_eq!(open.total_count, 2);
}

#[tokio::test]
async fn test_open_requests_exclude_claimed() {
    let app = app().await;
    let stores = &app.state.stores;
    let alice = seed_user(stores, "alice").await;
    let bob = seed_user(stores, "bob").await;

    let mut ids = Vec::new();
    for detail in ["one", "two", "three"] {
        let request = app
            .state
            .board
            .create(&alice, detail, "lunch")
            .await
            .unwrap();
        ids.push(request.id);
    }
    app.state.board.claim(&ids[1], &bob).await.unwrap();

    let open = app
        .state
        .board
        .list_open(ListingCursor::default())
        .await
        .unwrap();
    assert_eq!(open.total_count, 2);
    let details: Vec<&str> = open.items.iter().map(|r| r.request_detail.as_str()).collect();
    assert_eq!(details, ["one", "three"]);
}

#[tokio::test]
async fn test_leaderboard_ranks_are_absolute() {
    let app = app().await;
    let stores = &app.state.stores;
    for name in ["ann", "ben", "cat", "dan", "eve", "fay", "gus"] {
        seed_user(stores, name).await;
    }

    let page = app
        .state
        .leaderboard
        .rank(ListingCursor::new(3, 3).unwrap())
        .await
        .unwrap();
    let ranks: Vec<u64> = page.items.iter().map(|e| e.rank).collect();
    assert_eq!(ranks, [4, 5, 6]);
    // All tied at zero, so usernames decide
    assert_eq!(page.items[0].username, "dan");
    assert_eq!(page.total_pages, 3);
}
