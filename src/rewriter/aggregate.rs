//! Aggregation and suggestion compilation

use tracing::debug;

use super::QueryRewriter;
use crate::ast::{Aggregate, AggregateKind, RangeSpecEntry, SortOrder};
use crate::dsl::{
    Aggregation, AggregationNode, BucketOrder, CalendarInterval, QueryFragment, TermSuggestion,
};
use crate::error::RewriteError;
use crate::schema::DATE_COMPANION_SUFFIX;
use crate::Result;

impl QueryRewriter {
    /// Compile the tree's aggregate, if it has one
    pub fn rewrite_aggregations(&mut self) -> Result<Option<AggregationNode>> {
        let Some(aggregate) = self.tree.aggregate.clone() else {
            return Ok(None);
        };

        self.state.building_aggregate = true;
        let result = self.build_aggregate(&aggregate);
        self.state.building_aggregate = false;
        result.map(Some)
    }

    /// Compile the tree's term suggestion, if it has one
    pub fn rewrite_suggestions(&mut self) -> Result<Option<TermSuggestion>> {
        Ok(self
            .tree
            .suggest
            .as_ref()
            .map(|s| TermSuggestion::new(s.field.as_str(), s.stem.as_str(), s.max_terms)))
    }

    /// Index owning the aggregate's (or else the suggestion's) field
    pub fn aggregate_index_name(&mut self) -> Result<String> {
        let field = match (&self.tree.aggregate, &self.tree.suggest) {
            (Some(aggregate), _) => aggregate.field.clone(),
            (None, Some(suggest)) => suggest.field.clone(),
            (None, None) => {
                return Err(RewriteError::Rewrite(
                    "Cannot figure out which index to use for aggregation".to_string(),
                ))
            }
        };
        Ok(self.metadata.find_field(&field)?.index_name)
    }

    /// Aggregate field as named inside its own index
    ///
    /// A `name.` prefix addressing a named link is stripped.
    pub fn aggregate_field_name(&mut self) -> Result<String> {
        let field = self
            .tree
            .aggregate
            .as_ref()
            .map(|aggregate| aggregate.field.clone())
            .ok_or_else(|| RewriteError::Rewrite("Query has no aggregate".to_string()))?;

        if let Some((base, rest)) = field.split_once('.') {
            let link = self.metadata.find_field(&field)?;
            if link.name.as_deref() == Some(base) {
                return Ok(rest.to_string());
            }
        }
        Ok(field)
    }

    pub fn is_aggregate_nested(&self) -> bool {
        self.tree
            .aggregate
            .as_ref()
            .map(Aggregate::is_nested)
            .unwrap_or(false)
    }

    fn build_aggregate(&mut self, aggregate: &Aggregate) -> Result<AggregationNode> {
        let mut node = match &aggregate.kind {
            AggregateKind::Tally {
                stem,
                max_terms,
                sort_order,
            } => self.build_tally(&aggregate.field, stem, *max_terms, *sort_order)?,
            AggregateKind::Range { range_spec } => self.build_range(&aggregate.field, range_spec)?,
            AggregateKind::SignificantTerms { stem, max_terms } => {
                let md = self.metadata.metadata_for_my_index()?;
                let include = md
                    .field_type(&aggregate.field)
                    .filter(|t| t.is_string())
                    .map(|_| stem.clone());
                AggregationNode::new(
                    aggregate.field.as_str(),
                    Aggregation::SignificantTerms {
                        field: aggregate.field.clone(),
                        size: *max_terms,
                        include,
                    },
                )
            }
            AggregateKind::ExtendedStats => AggregationNode::new(
                aggregate.field.as_str(),
                Aggregation::ExtendedStats {
                    field: aggregate.field.clone(),
                },
            ),
        };

        if let Some(sub) = &aggregate.sub_aggregate {
            if !node.aggregation.is_bucketing() {
                return Err(RewriteError::Rewrite(format!(
                    "{} aggregates cannot have sub-aggregates",
                    aggregate.kind.name()
                )));
            }

            let owner = self.metadata.find_field(&sub.field)?;
            if owner.index_name != self.metadata.my_index().index_name {
                return Err(RewriteError::Rewrite(
                    "Nested aggregates in separate indexes are not supported".to_string(),
                ));
            }
            node = node.with_sub_aggregation(self.build_aggregate(sub)?);
        }

        if let Some(path) = &aggregate.nested_path {
            debug!(path = %path, field = %aggregate.field, "Scoping aggregate to nested documents");
            let filter = match self.tree.root {
                Some(root) => self.build(root)?,
                None => QueryFragment::match_all(),
            };
            let filtered = AggregationNode::new("filter", Aggregation::Filter { filter })
                .with_sub_aggregation(node)
                .with_sub_aggregation(AggregationNode::new(
                    "missing",
                    Aggregation::Missing {
                        field: aggregate.field.clone(),
                    },
                ));
            node = AggregationNode::new("nested", Aggregation::Nested { path: path.clone() })
                .with_sub_aggregation(filtered);
        }

        Ok(node)
    }

    fn build_tally(
        &mut self,
        field: &str,
        stem: &str,
        max_terms: u32,
        sort_order: SortOrder,
    ) -> Result<AggregationNode> {
        let md = self.metadata.metadata_for_field(field)?;

        let interval = if md.has_date_companion(field) {
            CalendarInterval::parse(stem)
        } else {
            None
        };

        if let Some(interval) = interval {
            let format = interval.format().ok_or_else(|| {
                RewriteError::Rewrite(format!("Unsupported date histogram interval: {}", stem))
            })?;
            return Ok(AggregationNode::new(
                field,
                Aggregation::DateHistogram {
                    field: format!("{}{}", field, DATE_COMPANION_SUFFIX),
                    interval,
                    format: format.to_string(),
                    order: BucketOrder::for_histogram(sort_order),
                },
            ));
        }

        let include = md
            .field_type(field)
            .filter(|t| t.is_string())
            .map(|_| stem.to_string());
        Ok(AggregationNode::new(
            field,
            Aggregation::Terms {
                field: field.to_string(),
                size: max_terms,
                shard_size: 0,
                order: BucketOrder::for_terms(sort_order),
                include,
            },
        ))
    }

    fn build_range(&mut self, field: &str, range_spec: &str) -> Result<AggregationNode> {
        let md = self.metadata.metadata_for_field(field)?;

        let aggregation = if md.has_date_companion(field) {
            Aggregation::DateRange {
                field: format!("{}{}", field, DATE_COMPANION_SUFFIX),
                ranges: RangeSpecEntry::<String>::parse_all(range_spec)?,
            }
        } else {
            Aggregation::Range {
                field: field.to_string(),
                ranges: RangeSpecEntry::<f64>::parse_all(range_spec)?,
            }
        };
        Ok(AggregationNode::new(field, aggregation))
    }
}
