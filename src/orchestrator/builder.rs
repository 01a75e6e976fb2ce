//! Transaction builder: turns an intent into an unsigned draft.
//!
//! The builder validates the intent, delegates construction to the asset SDK
//! and, when the intent carries a fee payment, layers a transfer plus a
//! fee-rate rebalance onto the same draft.

use std::sync::Arc;

use super::error::{OrchestrationError, OrchestrationResult};
use super::intent::{CreateClusterIntent, FeePayment, MintIntent, TransferIntent};
use crate::chain::skeleton::TransactionSkeleton;
use crate::chain::types::{Script, H256};
use crate::config::SporeConfig;
use crate::sdk::{AssetSdk, ClusterData, CreateClusterParams, CreateSporeParams, SporeData, TransferSporeParams};

/// An unsigned draft and the index of its asset output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuiltDraft {
    pub draft: TransactionSkeleton,
    pub output_index: usize,
}

impl BuiltDraft {
    /// Id of the asset output: its type script args.
    pub fn asset_id(&self) -> Option<H256> {
        let output = self.draft.output(self.output_index)?;
        let type_script = output.output.type_script.as_ref()?;
        H256::from_slice(&type_script.args).ok()
    }

    /// Fee the draft currently pays.
    pub fn fee(&self) -> Option<u64> {
        self.draft.fee()
    }
}

/// Anyone-can-pay lock for a public cluster owned by `owner_lock`: the owner
/// args without their one-byte prefix and one-byte suffix.
pub fn public_cluster_lock(config: &SporeConfig, owner_lock: &Script) -> Script {
    let args = match owner_lock.args.len() {
        len if len >= 2 => owner_lock.args[1..len - 1].to_vec(),
        _ => Vec::new(),
    };
    config.scripts.anyone_can_pay.script(args)
}

pub struct TransactionBuilder {
    sdk: Arc<dyn AssetSdk>,
    config: Arc<SporeConfig>,
    fee_rate: u64,
}

impl TransactionBuilder {
    pub fn new(sdk: Arc<dyn AssetSdk>, config: Arc<SporeConfig>) -> Self {
        let fee_rate = config.fees.fee_rate;
        Self { sdk, config, fee_rate }
    }

    /// Override the fee rate (shannons per 1000 bytes) used by fee payments.
    pub fn with_fee_rate(mut self, fee_rate: u64) -> Self {
        self.fee_rate = fee_rate;
        self
    }

    pub fn fee_rate(&self) -> u64 {
        self.fee_rate
    }

    pub fn config(&self) -> &SporeConfig {
        &self.config
    }

    fn resolve(&self, address: &str) -> OrchestrationResult<Script> {
        self.config
            .parse_address(address)
            .map_err(|e| OrchestrationError::invalid_address(address, e))
    }

    fn check_funding(&self, from_infos: &[String]) -> OrchestrationResult<()> {
        if from_infos.is_empty() {
            return Err(OrchestrationError::InvalidIntent("no funding address given".to_string()));
        }
        for address in from_infos {
            self.resolve(address)?;
        }
        Ok(())
    }

    fn check_fee_payment(&self, fee_payment: Option<&FeePayment>) -> OrchestrationResult<()> {
        if let Some(payment) = fee_payment {
            self.resolve(&payment.recipient)?;
            if payment.amount == 0 {
                return Err(OrchestrationError::InvalidIntent("fee payment amount is zero".to_string()));
            }
        }
        Ok(())
    }

    async fn apply_fee_payment(
        &self,
        draft: &mut TransactionSkeleton,
        from_infos: &[String],
        payment: &FeePayment,
    ) -> OrchestrationResult<()> {
        self.sdk
            .transfer(draft, from_infos, &payment.recipient, payment.amount, &self.config)
            .await?;
        self.sdk
            .pay_fee_by_fee_rate(draft, from_infos, self.fee_rate, &self.config)
            .await?;
        tracing::debug!(
            amount = payment.amount,
            recipient = %payment.recipient,
            fee_rate = self.fee_rate,
            "Layered fee payment onto draft"
        );
        Ok(())
    }

    pub async fn build_mint_draft(&self, intent: &MintIntent) -> OrchestrationResult<BuiltDraft> {
        if intent.content.is_empty() {
            return Err(OrchestrationError::InvalidIntent("content is empty".to_string()));
        }
        if intent.content_type.trim().is_empty() {
            return Err(OrchestrationError::InvalidIntent("content type is missing".to_string()));
        }
        self.check_funding(&intent.from_infos)?;
        let to_lock = self.resolve(&intent.owner)?;
        self.check_fee_payment(intent.fee_payment.as_ref())?;

        let built = self
            .sdk
            .create_spore(CreateSporeParams {
                data: SporeData {
                    content_type: intent.content_type.clone(),
                    content: intent.content.clone(),
                    cluster_id: intent.cluster_id,
                },
                from_infos: intent.from_infos.clone(),
                to_lock,
                config: &self.config,
                capacity_margin: intent.capacity_margin,
            })
            .await?;

        let mut draft = built.skeleton;
        if let Some(payment) = &intent.fee_payment {
            self.apply_fee_payment(&mut draft, &intent.from_infos, payment).await?;
        }
        Ok(BuiltDraft { draft, output_index: built.output_index })
    }

    pub async fn build_transfer_draft(&self, intent: &TransferIntent) -> OrchestrationResult<BuiltDraft> {
        self.check_funding(&intent.from_infos)?;
        let to_lock = self.resolve(&intent.to)?;

        let built = self
            .sdk
            .transfer_spore(TransferSporeParams {
                out_point: intent.out_point,
                from_infos: intent.from_infos.clone(),
                to_lock,
                config: &self.config,
                use_capacity_margin_as_fee: intent.fee_from_margin,
            })
            .await?;
        Ok(BuiltDraft { draft: built.skeleton, output_index: built.output_index })
    }

    pub async fn build_create_cluster_draft(&self, intent: &CreateClusterIntent) -> OrchestrationResult<BuiltDraft> {
        if intent.name.trim().is_empty() {
            return Err(OrchestrationError::InvalidIntent("cluster name is empty".to_string()));
        }
        if intent.description.trim().is_empty() {
            return Err(OrchestrationError::InvalidIntent("cluster description is empty".to_string()));
        }
        self.check_funding(&intent.from_infos)?;
        let owner_lock = self.resolve(&intent.owner)?;
        self.check_fee_payment(intent.fee_payment.as_ref())?;

        let to_lock = if intent.public {
            public_cluster_lock(&self.config, &owner_lock)
        } else {
            owner_lock
        };

        let built = self
            .sdk
            .create_cluster(CreateClusterParams {
                data: ClusterData { name: intent.name.clone(), description: intent.description.clone() },
                from_infos: intent.from_infos.clone(),
                to_lock,
                config: &self.config,
            })
            .await?;

        let mut draft = built.skeleton;
        if let Some(payment) = &intent.fee_payment {
            self.apply_fee_payment(&mut draft, &intent.from_infos, payment).await?;
        }
        Ok(BuiltDraft { draft, output_index: built.output_index })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::hash;
    use crate::chain::skeleton::calculate_fee;
    use crate::chain::types::SHANNONS_PER_CKB;
    use crate::devnet::Devnet;

    async fn setup() -> (TransactionBuilder, String) {
        let config = Arc::new(SporeConfig::devnet());
        let lock = config.scripts.omnilock.script({
            let mut args = vec![0x01];
            args.extend_from_slice(&[0x42; 20]);
            args.push(0x00);
            args
        });
        let address = config.encode_address(&lock);
        let devnet = Devnet::new(config.clone());
        devnet.fund(&lock, 4, 1_000 * SHANNONS_PER_CKB).await;
        (TransactionBuilder::new(Arc::new(devnet), config), address)
    }

    #[test]
    fn test_public_cluster_lock() {
        let config = SporeConfig::testnet();
        let mut args = vec![0x01];
        args.extend_from_slice(&[0xaa; 20]);
        args.push(0x00);
        let owner = config.scripts.omnilock.script(args.clone());

        let public = public_cluster_lock(&config, &owner);
        assert_eq!(public.args, args[1..21].to_vec());
        assert!(config.scripts.anyone_can_pay.matches(&public));
        assert_ne!(hash::script_hash(&public), hash::script_hash(&owner));
    }

    #[test]
    fn test_public_cluster_lock_short_args() {
        let config = SporeConfig::testnet();
        let owner = config.scripts.omnilock.script(vec![1]);
        assert!(public_cluster_lock(&config, &owner).args.is_empty());
    }

    #[tokio::test]
    async fn test_fee_rate_override() {
        let (builder, _) = setup().await;
        assert_eq!(builder.fee_rate(), 1000);
        assert_eq!(builder.with_fee_rate(3000).fee_rate(), 3000);
    }

    #[tokio::test]
    async fn test_mint_with_fee_payment_pays_rate_fee() {
        let (builder, address) = setup().await;
        let builder = builder.with_fee_rate(2000);
        let recipient = address.clone();
        let intent = MintIntent::new("text/plain", b"paid".to_vec(), &address)
            .with_fee_payment(100 * SHANNONS_PER_CKB, recipient);

        let built = builder.build_mint_draft(&intent).await.unwrap();
        let draft = &built.draft;
        assert_eq!(draft.input_capacity().unwrap(), draft.output_capacity().unwrap() + built.fee().unwrap());
        assert_eq!(built.fee(), Some(calculate_fee(draft.serialized_size(), 2000)));
    }

    #[tokio::test]
    async fn test_mint_validation() {
        let (builder, address) = setup().await;

        let empty = MintIntent::new("text/plain", Vec::new(), &address);
        assert!(matches!(builder.build_mint_draft(&empty).await, Err(OrchestrationError::InvalidIntent(_))));

        let bad_owner = MintIntent::new("text/plain", b"x".to_vec(), "ckt1notanaddress");
        assert!(matches!(
            builder.build_mint_draft(&bad_owner).await,
            Err(OrchestrationError::InvalidAddress { .. })
        ));

        let bad_recipient = MintIntent::new("text/plain", b"x".to_vec(), &address).with_fee_payment(1, "nope");
        assert!(matches!(
            builder.build_mint_draft(&bad_recipient).await,
            Err(OrchestrationError::InvalidAddress { .. })
        ));

        let mut unfunded = MintIntent::new("text/plain", b"x".to_vec(), &address);
        unfunded.from_infos.clear();
        assert!(matches!(builder.build_mint_draft(&unfunded).await, Err(OrchestrationError::InvalidIntent(_))));
    }

    #[tokio::test]
    async fn test_cluster_requires_name() {
        let (builder, address) = setup().await;
        let intent = CreateClusterIntent::new(" ", "desc", &address);
        assert!(matches!(
            builder.build_create_cluster_draft(&intent).await,
            Err(OrchestrationError::InvalidIntent(_))
        ));
    }

    #[tokio::test]
    async fn test_insufficient_funds() {
        let (builder, address) = setup().await;
        let intent = MintIntent::new("text/plain", b"x".to_vec(), &address).with_capacity_margin(10_000 * SHANNONS_PER_CKB);
        assert!(matches!(
            builder.build_mint_draft(&intent).await,
            Err(OrchestrationError::InsufficientFunds { .. })
        ));
    }
}
