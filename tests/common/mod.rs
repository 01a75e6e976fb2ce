//! Shared harness for the flow tests: a funded devnet, a connected key
//! wallet and an orchestrator wired to an in-memory notifier.

#![allow(dead_code)]

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use spore_demo::chain::skeleton::TransactionSkeleton;
use spore_demo::chain::types::{Cell, OutPoint};
use spore_demo::config::SporeConfig;
use spore_demo::notify::MemoryNotifier;
use spore_demo::orchestrator::{MintIntent, Orchestrator, SignedTransaction, SigningError, SigningGateway, TransactionBuilder};
use spore_demo::query::QueryCache;
use spore_demo::wallet::{Connector, KeyConnector};
use spore_demo::Devnet;

/// Anvil account #0.
pub const ALICE_KEY: &str = "ac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";
/// Anvil account #1.
pub const BOB_KEY: &str = "59c6995e998f97a5a0044966f0945389dc9e86dae88c7a8412f4603b6b78690d";

/// Testnet address receiving the test-mint payment.
pub const FEE_RECIPIENT: &str =
    "ckt1qzda0cr08m85hc8jlnfp3zer7xulejywt49kt2rr0vthywaa50xwsqt7flvttxlkc6demckpu7waxp7ped6ekaga6suuq";
pub const FEE_AMOUNT: u64 = 10_000_000_000;

/// Signer wrapper that counts calls and can stall before delegating.
pub struct CountingSigner {
    inner: Arc<dyn SigningGateway>,
    delay: Duration,
    calls: AtomicUsize,
}

impl CountingSigner {
    pub fn new(inner: Arc<dyn SigningGateway>) -> Self {
        Self { inner, delay: Duration::ZERO, calls: AtomicUsize::new(0) }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SigningGateway for CountingSigner {
    async fn sign(&self, draft: TransactionSkeleton) -> Result<SignedTransaction, SigningError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.inner.sign(draft).await
    }
}

pub struct Harness {
    pub config: Arc<SporeConfig>,
    pub devnet: Arc<Devnet>,
    pub wallet: Arc<KeyConnector>,
    pub address: String,
    pub cache: Arc<QueryCache>,
    pub notifier: MemoryNotifier,
    pub signer: Arc<CountingSigner>,
    pub orchestrator: Orchestrator,
}

impl Harness {
    /// Devnet preset, Alice funded and connected.
    pub async fn new() -> Self {
        Self::with_config(SporeConfig::devnet()).await
    }

    pub async fn with_config(config: SporeConfig) -> Self {
        let config = Arc::new(config);
        let devnet = Arc::new(Devnet::new(config.clone()));
        let wallet = Arc::new(KeyConnector::from_private_key(ALICE_KEY, config.clone()).unwrap());
        let session = wallet.connect().unwrap();
        devnet.fund_genesis(&session.lock).await;

        let signer = Arc::new(CountingSigner::new(wallet.clone()).with_delay(Duration::from_millis(20)));
        let cache = Arc::new(QueryCache::new(config.clone()));
        let notifier = MemoryNotifier::new();
        let orchestrator = Orchestrator::new(
            TransactionBuilder::new(devnet.clone(), config.clone()),
            signer.clone(),
            devnet.clone(),
            cache.clone(),
            Arc::new(notifier.clone()),
        );

        Self {
            config,
            devnet,
            wallet,
            address: session.address,
            cache,
            notifier,
            signer,
            orchestrator,
        }
    }

    /// A second funded wallet with its own orchestrator over the same chain.
    pub async fn second_wallet(&self, key: &str) -> (Arc<KeyConnector>, String, Orchestrator) {
        let wallet = Arc::new(KeyConnector::from_private_key(key, self.config.clone()).unwrap());
        let session = wallet.connect().unwrap();
        self.devnet.fund_genesis(&session.lock).await;
        let orchestrator = Orchestrator::new(
            TransactionBuilder::new(self.devnet.clone(), self.config.clone()),
            wallet.clone(),
            self.devnet.clone(),
            self.cache.clone(),
            Arc::new(self.notifier.clone()),
        );
        (wallet, session.address, orchestrator)
    }

    /// Mint a plain-text spore owned by Alice and return its out point.
    pub async fn mint_text(&self, text: &str) -> OutPoint {
        let intent = MintIntent::new("text/plain", text.as_bytes().to_vec(), &self.address);
        self.orchestrator.mint_spore(&intent).await.unwrap().out_point
    }

    pub async fn live(&self, out_point: &OutPoint) -> Cell {
        self.devnet.live_cell(out_point).await.unwrap()
    }
}
