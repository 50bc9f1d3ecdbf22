use anyhow::Result;
use serde::{Deserialize, Serialize};
use types::{containers::Validator, primitives::ConsensusAddress};

use crate::storage::Store;

pub const DEFAULT_PAGE_LIMIT: usize = 100;

#[derive(Clone, Copy, PartialEq, Eq, Default, Debug, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct PageRequest {
    /// First consensus address to return. `None` starts at the beginning.
    pub key: Option<ConsensusAddress>,
    /// Maximum number of validators to return. 0 means [`DEFAULT_PAGE_LIMIT`].
    pub limit: usize,
}

#[derive(Clone, PartialEq, Eq, Debug, Deserialize, Serialize)]
pub struct ValidatorsPage {
    pub validators: Vec<Validator>,
    /// Key to request the next page with. `None` if this is the last page.
    pub next_key: Option<ConsensusAddress>,
    pub total: usize,
}

/// Validators ordered by consensus address.
pub fn validators(store: Store, page: &PageRequest) -> Result<ValidatorsPage> {
    let limit = if page.limit == 0 {
        DEFAULT_PAGE_LIMIT
    } else {
        page.limit
    };

    let start = page.key.unwrap_or_else(ConsensusAddress::zero);

    let mut validators = store
        .validators_from(start)?
        .take(limit.saturating_add(1))
        .collect::<Result<Vec<_>>>()?;

    let next_key = if validators.len() > limit {
        validators.pop().map(|validator| validator.consensus_address)
    } else {
        None
    };

    let total = store.validators()?.len();

    Ok(ValidatorsPage {
        validators,
        next_key,
        total,
    })
}
