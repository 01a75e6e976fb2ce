//! Spore transfers through the full orchestrated flow on a devnet.

use spore_demo::orchestrator::{MintIntent, OrchestrationError, TransferIntent};
use spore_demo::query::{QueryKey, ReadModel};
use spore_demo::wallet::Connector;

mod common;

use common::{Harness, BOB_KEY};

fn transfer(h: &Harness, out_point: spore_demo::chain::types::OutPoint, to: &str) -> TransferIntent {
    TransferIntent {
        out_point,
        to: to.to_string(),
        from_infos: vec![h.address.clone()],
        fee_from_margin: false,
    }
}

#[tokio::test]
async fn test_transfer_keeps_id_and_moves_cell() {
    let h = Harness::new().await;
    let (bob, bob_address, _) = h.second_wallet(BOB_KEY).await;
    let out_point = h.mint_text("gift").await;
    let spore = h.devnet.spores_by_lock(&h.wallet.lock()).await.remove(0);

    let receipt = h.orchestrator.transfer_spore(&transfer(&h, out_point, &bob_address)).await.unwrap();
    assert_eq!(receipt.spore_id, spore.id);
    assert_ne!(receipt.out_point, out_point);
    assert!(h.devnet.live_cell(&out_point).await.is_none());

    let moved = h.devnet.spore(&spore.id).await.unwrap();
    assert_eq!(moved.out_point, receipt.out_point);
    assert_eq!(moved.owner, bob.lock());
    assert_eq!(moved.content, b"gift");
    assert!(h.devnet.spores_by_lock(&h.wallet.lock()).await.is_empty());

    let notice = h.notifier.last().unwrap();
    assert_eq!(notice.title, "Spore Transferred!");
    assert_eq!(notice.link, Some(format!("/spore/{}", spore.id)));
}

#[tokio::test]
async fn test_margin_pays_transfer_fee() {
    let h = Harness::new().await;
    let (_, bob_address, _) = h.second_wallet(BOB_KEY).await;
    let margin = h.config.fees.capacity_margin;
    let intent = MintIntent::new("text/plain", b"self-funded".to_vec(), &h.address).with_capacity_margin(margin);
    let minted = h.orchestrator.mint_spore(&intent).await.unwrap();
    let before = h.live(&minted.out_point).await;
    assert_eq!(before.capacity_margin(), margin);
    let balance = h.devnet.balance(&h.wallet.lock()).await;

    let intent = TransferIntent { fee_from_margin: true, ..transfer(&h, minted.out_point, &bob_address) };
    let receipt = h.orchestrator.transfer_spore(&intent).await.unwrap();

    let tx = h.devnet.transaction(&receipt.tx_hash).await.unwrap();
    assert_eq!(tx.inputs.len(), 1);
    assert_eq!(tx.outputs.len(), 1);

    let after = h.live(&receipt.out_point).await;
    let fee = before.output.capacity - after.output.capacity;
    assert!(fee > 0);
    assert_eq!(after.capacity_margin(), margin - fee);
    assert_eq!(h.devnet.balance(&h.wallet.lock()).await, balance);
}

#[tokio::test]
async fn test_margin_fee_without_margin_fails() {
    let h = Harness::new().await;
    let out_point = h.mint_text("no margin").await;

    let intent = TransferIntent { fee_from_margin: true, ..transfer(&h, out_point, &h.address) };
    let err = h.orchestrator.transfer_spore(&intent).await.unwrap_err();
    assert!(matches!(err, OrchestrationError::InsufficientFunds { .. }));
}

#[tokio::test]
async fn test_spent_out_point_is_not_found() {
    let h = Harness::new().await;
    let (_, bob_address, _) = h.second_wallet(BOB_KEY).await;
    let out_point = h.mint_text("once").await;
    h.orchestrator.transfer_spore(&transfer(&h, out_point, &bob_address)).await.unwrap();
    let calls = h.signer.calls();

    let err = h.orchestrator.transfer_spore(&transfer(&h, out_point, &bob_address)).await.unwrap_err();
    assert!(matches!(err, OrchestrationError::AssetNotFound(_)));
    assert_eq!(h.signer.calls(), calls);
}

#[tokio::test]
async fn test_bad_recipient_never_reaches_signer() {
    let h = Harness::new().await;
    let out_point = h.mint_text("stay").await;
    let calls = h.signer.calls();

    let err = h.orchestrator.transfer_spore(&transfer(&h, out_point, "ckt1invalid")).await.unwrap_err();
    assert!(matches!(err, OrchestrationError::InvalidAddress { .. }));
    assert_eq!(h.signer.calls(), calls);
    assert!(h.devnet.live_cell(&out_point).await.is_some());
}

#[tokio::test]
async fn test_concurrent_transfer_is_refused() {
    let h = Harness::new().await;
    let (_, bob_address, _) = h.second_wallet(BOB_KEY).await;
    let out_point = h.mint_text("contested").await;
    let intent = transfer(&h, out_point, &bob_address);

    let (first, second) = tokio::join!(
        h.orchestrator.transfer_spore(&intent),
        h.orchestrator.transfer_spore(&intent)
    );
    assert!(first.is_ok());
    assert!(matches!(second, Err(OrchestrationError::AlreadyInFlight(_))));

    // The guard is gone once the first action finished.
    let err = h.orchestrator.transfer_spore(&intent).await.unwrap_err();
    assert!(matches!(err, OrchestrationError::AssetNotFound(_)));
}

#[tokio::test]
async fn test_transfer_invalidates_both_owners() {
    let h = Harness::new().await;
    let (_, bob_address, _) = h.second_wallet(BOB_KEY).await;
    let out_point = h.mint_text("cached").await;
    let spore = h.devnet.spores_by_lock(&h.wallet.lock()).await.remove(0);

    let keys = [
        QueryKey::SporesByAddress(h.address.clone()),
        QueryKey::SporesByAddress(bob_address.clone()),
        QueryKey::Spore(spore.id),
    ];
    for key in &keys {
        h.cache.fetch(key, h.devnet.as_ref()).await.unwrap();
    }
    let unrelated = QueryKey::ClustersByAddress(h.address.clone());
    h.cache.fetch(&unrelated, h.devnet.as_ref()).await.unwrap();

    h.orchestrator.transfer_spore(&transfer(&h, out_point, &bob_address)).await.unwrap();
    for key in &keys {
        assert!(!h.cache.contains(key), "{:?} still cached", key);
    }
    assert!(h.cache.contains(&unrelated));
}
