//! Rule-based bronze → silver transformation.
//!
//! Each entity has a transformer that applies field rules left to right and
//! its row policy (deduplication, dropping rows without a key). Transformers
//! never fail: malformed fields degrade to their documented fallback.

use chrono::{NaiveDate, Utc};
use std::collections::HashMap;
use tracing::debug;

use crate::domain::{BronzeRow, EntityKind, SilverBatch};
use crate::error::{PipelineError, Result};

pub mod rules;
pub mod transformers;

use transformers::{
    CustomerTransformer, ErpCustomerDemoTransformer, ErpLocationTransformer,
    ProductCategoryTransformer, ProductTransformer, SalesDetailTransformer,
};

/// Inputs every transformation may depend on besides the rows themselves
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransformContext {
    /// Reference date for "in the future" rules
    pub today: NaiveDate,
}

/// Transformation of one entity's bronze rows into silver rows
pub trait EntityTransformer: Send + Sync {
    fn entity(&self) -> EntityKind;

    fn transform(&self, rows: &[BronzeRow], ctx: &TransformContext) -> SilverBatch;
}

/// Registry of entity transformers
pub struct RuleEngine {
    transformers: HashMap<EntityKind, Box<dyn EntityTransformer>>,
    context: TransformContext,
}

impl RuleEngine {
    /// Engine with all built-in transformers, evaluating date rules against `today`
    pub fn new(today: NaiveDate) -> Self {
        let mut engine = Self {
            transformers: HashMap::new(),
            context: TransformContext { today },
        };
        engine.register(Box::new(CustomerTransformer));
        engine.register(Box::new(ProductTransformer));
        engine.register(Box::new(SalesDetailTransformer));
        engine.register(Box::new(ErpCustomerDemoTransformer));
        engine.register(Box::new(ErpLocationTransformer));
        engine.register(Box::new(ProductCategoryTransformer));
        engine
    }

    pub fn register(&mut self, transformer: Box<dyn EntityTransformer>) {
        self.transformers.insert(transformer.entity(), transformer);
    }

    /// Transforms a bronze row set into the entity's silver row set
    pub fn transform(&self, entity: EntityKind, rows: &[BronzeRow]) -> Result<SilverBatch> {
        let transformer = self
            .transformers
            .get(&entity)
            .ok_or_else(|| PipelineError::Config(format!("No transformer registered for {}", entity)))?;
        let batch = transformer.transform(rows, &self.context);
        debug!(entity = %entity, bronze_rows = rows.len(), silver_rows = batch.len(), "Transformed entity");
        Ok(batch)
    }

    pub fn entities(&self) -> Vec<EntityKind> {
        let mut entities: Vec<EntityKind> = self.transformers.keys().copied().collect();
        entities.sort();
        entities
    }
}

impl Default for RuleEngine {
    fn default() -> Self {
        Self::new(Utc::now().date_naive())
    }
}
