//! In-memory store behavior: atomicity, duplicate rejection, revert.

use alloy_primitives::{address, keccak256, Address, Bytes, B256, U256};
use offchan_commitments::{
    ConditionalTransactionCommitment, DomainParams, SetStateCommitment, SetupCommitment,
};
use offchan_store::{FaultPoint, InMemoryStore, Signing, Store, WithdrawalRecord};
use offchan_types::{
    AppIdentity, InterpreterParams, Proposal, PublicIdentifier, StateChannel,
    CONVENTION_FOR_ETH_TOKEN_ADDRESS,
};

const A: Address = address!("aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa");
const B: Address = address!("bbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb");
const MULTISIG: Address = address!("1111111111111111111111111111111111111111");
const APP_DEF: Address = address!("00000000000000000000000000000000000000aa");
const REGISTRY: Address = address!("00000000000000000000000000000000000000cc");

fn domain() -> DomainParams {
    DomainParams {
        name: "MinimumViableMultisig".into(),
        version: "1".into(),
        chain_id: 1,
        salt: B256::ZERO,
    }
}

fn channel() -> StateChannel {
    let identifiers = [
        PublicIdentifier::new("xpubAlice000000000000000000").unwrap(),
        PublicIdentifier::new("xpubBob00000000000000000000").unwrap(),
    ];
    let chan = StateChannel::setup(MULTISIG, 1, identifiers, [A, B], APP_DEF, 100);
    let chan = chan
        .credit_free_balance(CONVENTION_FOR_ETH_TOKEN_ADDRESS, &A, U256::from(500))
        .unwrap();
    chan.credit_free_balance(CONVENTION_FOR_ETH_TOKEN_ADDRESS, &B, U256::from(500))
        .unwrap()
}

fn setup_commitment(chan: &StateChannel) -> SetupCommitment {
    SetupCommitment::new(
        MULTISIG,
        *chan.multisig_owners(),
        REGISTRY,
        address!("00000000000000000000000000000000000000ee"),
        chan.free_balance().identity_hash(),
        domain(),
    )
}

fn fb_set_state(chan: &StateChannel) -> SetStateCommitment {
    let fb = chan.free_balance();
    SetStateCommitment::new(
        fb.identity.clone(),
        fb.state_hash(),
        fb.version_number,
        fb.state_timeout,
        REGISTRY,
    )
}

fn proposal(chan: &StateChannel) -> Proposal {
    let [initiator, responder] = chan.user_identifiers().clone();
    Proposal {
        identity: AppIdentity::new(chan.next_channel_nonce(), [A, B], APP_DEF, 100),
        initiator,
        responder,
        initiator_deposit: U256::from(100),
        initiator_deposit_token: CONVENTION_FOR_ETH_TOKEN_ADDRESS,
        responder_deposit: U256::from(100),
        responder_deposit_token: CONVENTION_FOR_ETH_TOKEN_ADDRESS,
        initial_state: Bytes::from(U256::ZERO.to_be_bytes::<32>().to_vec()),
        state_timeout: 50,
        interpreter_params: InterpreterParams {
            limit: vec![U256::from(200)],
            token_addresses: vec![CONVENTION_FOR_ETH_TOKEN_ADDRESS],
        },
    }
}

fn app_set_state(prop: &Proposal) -> SetStateCommitment {
    SetStateCommitment::new(
        prop.identity.clone(),
        keccak256(&prop.initial_state),
        1,
        prop.state_timeout,
        REGISTRY,
    )
}

fn conditional(chan: &StateChannel, prop: &Proposal) -> ConditionalTransactionCommitment {
    ConditionalTransactionCommitment::new(
        MULTISIG,
        *chan.multisig_owners(),
        REGISTRY,
        address!("00000000000000000000000000000000000000ee"),
        chan.free_balance().identity_hash(),
        prop.identity_hash(),
        address!("00000000000000000000000000000000000000dd"),
        prop.interpreter_params.abi_encode().into(),
        prop.identity.channel_nonce,
        domain(),
    )
}

async fn seeded_store() -> (InMemoryStore, StateChannel) {
    let store = InMemoryStore::new();
    let chan = channel();
    store
        .create_state_channel(&chan, &setup_commitment(&chan), &fb_set_state(&chan))
        .await
        .unwrap();
    (store, chan)
}

#[tokio::test]
async fn test_create_channel_and_lookups() {
    let (store, chan) = seeded_store().await;

    let by_multisig = store.get_state_channel(&MULTISIG).await.unwrap().unwrap();
    assert_eq!(by_multisig, chan);

    // Owner order does not matter for lookup.
    let by_owners = store
        .get_state_channel_by_owners(&[B, A])
        .await
        .unwrap()
        .unwrap();
    assert_eq!(by_owners.multisig_address(), MULTISIG);

    let fb_hash = chan.free_balance().identity_hash();
    assert!(store
        .get_state_channel_by_app_identity_hash(&fb_hash)
        .await
        .unwrap()
        .is_some());
    assert!(store.get_setup_commitment(&MULTISIG).await.unwrap().is_some());
    assert!(store
        .get_set_state_commitment(&fb_hash, Signing::Double)
        .await
        .unwrap()
        .is_some());
}

#[tokio::test]
async fn test_missing_reads_return_none() {
    let store = InMemoryStore::new();
    assert!(store.get_state_channel(&MULTISIG).await.unwrap().is_none());
    assert!(store
        .get_set_state_commitment(&B256::repeat_byte(1), Signing::Single)
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn test_duplicate_channel_rejected() {
    let (store, chan) = seeded_store().await;
    let err = store
        .create_state_channel(&chan, &setup_commitment(&chan), &fb_set_state(&chan))
        .await
        .unwrap_err();
    assert!(matches!(err, offchan_store::StoreError::ChannelExists(_)));
}

#[tokio::test]
async fn test_duplicate_proposal_rejected_at_store() {
    let (store, chan) = seeded_store().await;
    let prop = proposal(&chan);
    let next = chan.propose_app(prop.clone()).unwrap();
    store
        .create_app_proposal(&next, &prop, &app_set_state(&prop))
        .await
        .unwrap();

    // Replaying the same proposal against the now-persisted channel
    // fails on the identity-hash duplicate check.
    let err = store
        .create_app_proposal(&next, &prop, &app_set_state(&prop))
        .await
        .unwrap_err();
    assert!(matches!(err, offchan_store::StoreError::DuplicateApp(_)));
}

#[tokio::test]
async fn test_install_crash_reverts_all_writes() {
    let (store, chan) = seeded_store().await;
    let prop = proposal(&chan);
    let hash = prop.identity_hash();
    let proposed = chan.propose_app(prop.clone()).unwrap();
    store
        .create_app_proposal(&proposed, &prop, &app_set_state(&prop))
        .await
        .unwrap();

    let pre_channel = store.get_state_channel(&MULTISIG).await.unwrap().unwrap();
    let fb_hash = pre_channel.free_balance().identity_hash();
    let pre_fb_commitment = store
        .get_set_state_commitment(&fb_hash, Signing::Double)
        .await
        .unwrap();

    // The conditional-commitment write fails after the channel write.
    store.inject_fault(FaultPoint::ConditionalWrite);
    let installed = proposed.install_app(&hash).unwrap();
    let err = store
        .create_app_instance(&installed, &hash, &fb_set_state(&installed), &conditional(&proposed, &prop))
        .await
        .unwrap_err();
    assert!(matches!(err, offchan_store::StoreError::WriteFailed(_)));

    // Revert restored the previous channel: proposal intact, app absent,
    // and the previous free-balance commitment.
    let post_channel = store.get_state_channel(&MULTISIG).await.unwrap().unwrap();
    assert_eq!(post_channel, pre_channel);
    assert!(post_channel.proposed_app_instances().contains_key(&hash));
    assert!(post_channel.app(&hash).is_err());
    let post_fb_commitment = store
        .get_set_state_commitment(&fb_hash, Signing::Double)
        .await
        .unwrap();
    assert_eq!(post_fb_commitment, pre_fb_commitment);
    assert!(store.get_conditional_tx_commitment(&hash).await.unwrap().is_none());
}

#[tokio::test]
async fn test_single_and_double_set_state_coexist() {
    let (store, chan) = seeded_store().await;
    let prop = proposal(&chan);
    let hash = prop.identity_hash();
    let proposed = chan.propose_app(prop.clone()).unwrap();
    store
        .create_app_proposal(&proposed, &prop, &app_set_state(&prop))
        .await
        .unwrap();
    let installed = proposed.install_app(&hash).unwrap();
    store
        .create_app_instance(&installed, &hash, &fb_set_state(&installed), &conditional(&proposed, &prop))
        .await
        .unwrap();

    let single = SetStateCommitment::new(prop.identity.clone(), B256::repeat_byte(9), 2, 50, REGISTRY);
    let double = SetStateCommitment::new(prop.identity.clone(), B256::repeat_byte(9), 2, 50, REGISTRY);
    let advanced = installed
        .set_app_state(&hash, Bytes::from(vec![9u8; 32]), 50, None)
        .unwrap();
    store
        .update_app_instance(&advanced, &hash, &single, Signing::Single)
        .await
        .unwrap();
    store
        .update_app_instance(&advanced, &hash, &double, Signing::Double)
        .await
        .unwrap();

    // Distinct keys; neither overwrites the other.
    assert!(store
        .get_set_state_commitment(&hash, Signing::Single)
        .await
        .unwrap()
        .is_some());
    assert_eq!(
        store
            .get_set_state_commitment(&hash, Signing::Double)
            .await
            .unwrap()
            .unwrap()
            .version_number(),
        2
    );
}

#[tokio::test]
async fn test_replayed_persist_is_idempotent() {
    let (store, chan) = seeded_store().await;
    let prop = proposal(&chan);
    let hash = prop.identity_hash();
    let proposed = chan.propose_app(prop.clone()).unwrap();
    store
        .create_app_proposal(&proposed, &prop, &app_set_state(&prop))
        .await
        .unwrap();
    let installed = proposed.install_app(&hash).unwrap();
    store
        .create_app_instance(&installed, &hash, &fb_set_state(&installed), &conditional(&proposed, &prop))
        .await
        .unwrap();

    let advanced = installed
        .set_app_state(&hash, Bytes::from(vec![9u8; 32]), 50, None)
        .unwrap();
    let commitment = SetStateCommitment::new(prop.identity.clone(), B256::repeat_byte(9), 2, 50, REGISTRY);
    store
        .update_app_instance(&advanced, &hash, &commitment, Signing::Double)
        .await
        .unwrap();
    let first = store.get_state_channel(&MULTISIG).await.unwrap().unwrap();

    // Applying the same write again yields an identical post-state.
    store
        .update_app_instance(&advanced, &hash, &commitment, Signing::Double)
        .await
        .unwrap();
    let second = store.get_state_channel(&MULTISIG).await.unwrap().unwrap();
    assert_eq!(first, second);
    assert_eq!(
        store
            .get_set_state_commitment(&hash, Signing::Double)
            .await
            .unwrap()
            .unwrap(),
        commitment
    );
}

#[tokio::test]
async fn test_withdrawal_monitor_set() {
    let (store, _) = seeded_store().await;
    let record = WithdrawalRecord {
        multisig: MULTISIG,
        recipient: address!("9999999999999999999999999999999999999999"),
        asset_id: CONVENTION_FOR_ETH_TOKEN_ADDRESS,
        amount: U256::from(10),
        withdrawal_nonce: 1,
    };
    store.save_user_withdrawal(&record).await.unwrap();
    assert_eq!(store.get_user_withdrawals().await.unwrap().len(), 1);
    store.remove_user_withdrawal(&record).await.unwrap();
    assert!(store.get_user_withdrawals().await.unwrap().is_empty());
    assert!(store.remove_user_withdrawal(&record).await.is_err());
}

#[tokio::test]
async fn test_schema_version_rejects_downgrade() {
    let store = InMemoryStore::new();
    let current = store.get_schema_version().await.unwrap();
    store.update_schema_version(current + 1).await.unwrap();
    let err = store.update_schema_version(current).await.unwrap_err();
    assert!(matches!(
        err,
        offchan_store::StoreError::SchemaDowngrade { .. }
    ));
}
