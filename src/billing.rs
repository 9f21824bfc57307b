// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Plan-tier lookup
//!
//! The engine never fetches billing data itself. It reads a cached tier
//! through [`BillingStatus`] at the moment it needs to decide.

use std::sync::RwLock;

use crate::config::BillingConfig;

/// Plan tier gating paid-only behavior
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlanTier {
    Free,
    Paid,
}

impl PlanTier {
    /// Classify a cached product name.
    ///
    /// Missing names and names containing "free" (any case) are free.
    pub fn from_product_name(product_name: Option<&str>) -> Self {
        match product_name {
            Some(name) if !name.to_lowercase().contains("free") => PlanTier::Paid,
            _ => PlanTier::Free,
        }
    }

    pub fn is_free(self) -> bool {
        self == PlanTier::Free
    }
}

/// Billing-status collaborator; read synchronously, never re-fetched
pub trait BillingStatus: Send + Sync {
    fn plan_tier(&self) -> PlanTier;
}

/// Billing status backed by a cached product name
#[derive(Debug, Default)]
pub struct CachedBillingStatus {
    product_name: RwLock<Option<String>>,
}

impl CachedBillingStatus {
    pub fn new(product_name: Option<String>) -> Self {
        Self {
            product_name: RwLock::new(product_name),
        }
    }

    pub fn from_config(config: &BillingConfig) -> Self {
        Self::new(config.product_name.clone())
    }

    /// Replace the cached product name after an external refresh
    pub fn set_product_name(&self, product_name: Option<String>) {
        match self.product_name.write() {
            Ok(mut guard) => *guard = product_name,
            Err(poisoned) => *poisoned.into_inner() = product_name,
        }
    }
}

impl BillingStatus for CachedBillingStatus {
    fn plan_tier(&self) -> PlanTier {
        let guard = match self.product_name.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        PlanTier::from_product_name(guard.as_deref())
    }
}

/// Fixed tier, handy for tests and offline runs
impl BillingStatus for PlanTier {
    fn plan_tier(&self) -> PlanTier {
        *self
    }
}
