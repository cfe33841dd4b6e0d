//! Builder for transform step lists with auto-incrementing order.

use serde_json::Value;

use traffboard_core::types::{DataTransformStep, TransformType};

#[derive(Debug, Default)]
pub struct TransformBuilder {
    transforms: Vec<DataTransformStep>,
    current_order: u32,
}

impl TransformBuilder {
    pub fn new() -> Self {
        Self {
            transforms: Vec::new(),
            current_order: 1,
        }
    }

    fn push(mut self, id: String, transform_type: TransformType, config: Value) -> Self {
        self.transforms.push(DataTransformStep {
            id,
            transform_type,
            order: self.current_order,
            config,
        });
        self.current_order += 1;
        self
    }

    pub fn filter(self, config: Value) -> Self {
        let id = format!("filter_{}", self.current_order);
        self.push(id, TransformType::Filter, config)
    }

    pub fn aggregate(self, group_by: &[&str], aggregates: Value) -> Self {
        let id = format!("aggregate_{}", self.current_order);
        let config = serde_json::json!({ "group_by": group_by, "aggregates": aggregates });
        self.push(id, TransformType::Aggregate, config)
    }

    pub fn cohort(self, config: Value) -> Self {
        let id = format!("cohort_{}", self.current_order);
        self.push(id, TransformType::Cohort, config)
    }

    pub fn custom(self, id: &str, config: Value) -> Self {
        self.push(id.to_string(), TransformType::Custom, config)
    }

    pub fn build(self) -> Vec<DataTransformStep> {
        self.transforms
    }

    pub fn reset(mut self) -> Self {
        self.transforms.clear();
        self.current_order = 1;
        self
    }
}
