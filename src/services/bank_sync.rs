//! Bank catalogue synchronization
//!
//! Both providers publish their own bank lists with their own codes. Sync
//! fetches both, joins them into the mapping table, and reports how many
//! banks ended up fully mapped. A bank present on only one side is still
//! stored so operators can see the gap.

use futures::future::try_join;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

use crate::database::bank_mapping_repository::{BankMappingRepository, BankMappingUpsert};
use crate::error::{AppError, AppResult};
use crate::gateway::types::BankEntry;
use crate::gateway::GatewayAdapter;

/// Outcome of one catalogue sync
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BankSyncSummary {
    pub total: usize,
    pub fully_mapped: usize,
    pub disburse_only: usize,
    pub inquiry_only: usize,
}

pub struct BankSyncService {
    banks: Arc<dyn BankMappingRepository>,
    disburser: Arc<dyn GatewayAdapter>,
    inquirer: Arc<dyn GatewayAdapter>,
}

impl BankSyncService {
    pub fn new(
        banks: Arc<dyn BankMappingRepository>,
        disburser: Arc<dyn GatewayAdapter>,
        inquirer: Arc<dyn GatewayAdapter>,
    ) -> Self {
        Self {
            banks,
            disburser,
            inquirer,
        }
    }

    pub async fn sync(&self) -> AppResult<BankSyncSummary> {
        let (disburse_banks, inquiry_banks) =
            try_join(self.disburser.bank_list(), self.inquirer.bank_list())
                .await
                .map_err(AppError::from)?;

        let joined = join_catalogues(&disburse_banks, &inquiry_banks);

        let mut summary = BankSyncSummary {
            total: joined.len(),
            ..Default::default()
        };

        for mapping in &joined {
            match (&mapping.disburse_code, &mapping.inquiry_code) {
                (Some(_), Some(_)) => summary.fully_mapped += 1,
                (Some(_), None) => summary.disburse_only += 1,
                (None, Some(_)) => summary.inquiry_only += 1,
                (None, None) => {}
            }
            self.banks.upsert(mapping).await.map_err(AppError::from)?;
        }

        info!(
            total = summary.total,
            fully_mapped = summary.fully_mapped,
            disburse_only = summary.disburse_only,
            inquiry_only = summary.inquiry_only,
            "bank catalogue synced"
        );

        Ok(summary)
    }
}

/// Join both catalogues on provider code, falling back to a normalized
/// bank name match when the codes differ.
fn join_catalogues(disburse: &[BankEntry], inquiry: &[BankEntry]) -> Vec<BankMappingUpsert> {
    let by_code: HashMap<&str, &BankEntry> =
        inquiry.iter().map(|b| (b.code.as_str(), b)).collect();
    let by_name: HashMap<String, &BankEntry> =
        inquiry.iter().map(|b| (normalize(&b.name), b)).collect();

    let mut matched_inquiry: Vec<bool> = vec![false; inquiry.len()];
    let mut mappings = Vec::with_capacity(disburse.len());

    for entry in disburse {
        let matched = by_code
            .get(entry.code.as_str())
            .or_else(|| by_name.get(&normalize(&entry.name)))
            .copied();

        if let Some(counterpart) = matched {
            if let Some(index) = inquiry
                .iter()
                .position(|b| b.code == counterpart.code)
            {
                matched_inquiry[index] = true;
            }
        }

        mappings.push(BankMappingUpsert {
            bank_code: entry.code.clone(),
            bank_name: entry.name.clone(),
            disburse_code: Some(entry.code.clone()),
            inquiry_code: matched.map(|b| b.code.clone()),
            disburse_meta: Some(entry.raw.clone()),
            inquiry_meta: matched.map(|b| b.raw.clone()),
        });
    }

    for (index, entry) in inquiry.iter().enumerate() {
        if matched_inquiry[index] {
            continue;
        }
        mappings.push(BankMappingUpsert {
            bank_code: entry.code.clone(),
            bank_name: entry.name.clone(),
            disburse_code: None,
            inquiry_code: Some(entry.code.clone()),
            disburse_meta: None,
            inquiry_meta: Some(entry.raw.clone()),
        });
    }

    mappings
}

fn normalize(name: &str) -> String {
    name.chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .collect::<String>()
        .to_lowercase()
}
