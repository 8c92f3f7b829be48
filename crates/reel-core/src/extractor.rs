use crate::error::AppError;
use crate::fields::FieldSpec;
use crate::guard::PageGuard;
use crate::models::{ExtractionOutcome, FieldName, FieldValues, Phase};
use crate::resolver::resolve_field;
use crate::traits::PageScope;

/// All field outcomes for one item, plus the fault that truncated
/// extraction, if any.
#[derive(Debug, Default)]
pub struct Extraction {
    pub values: FieldValues,
    pub fault: Option<AppError>,
}

impl Extraction {
    pub fn value(&self, field: FieldName) -> Option<&str> {
        self.values.get(&field).and_then(|o| o.value.as_deref())
    }

    pub fn resolved(&self) -> usize {
        self.values.values().filter(|o| o.value.is_some()).count()
    }
}

/// Runs a whole field table against one scope.
///
/// Never fails: per-candidate faults are absorbed by the resolver. A
/// terminal or unknown fault stops the table; the fields resolved so far
/// are kept, the rest are recorded as missing, and the fault is returned
/// alongside them.
pub async fn extract_fields<S: PageScope>(
    guard: &PageGuard,
    scope: &S,
    phase: Phase,
    fields: &[FieldSpec],
) -> Extraction {
    let mut extraction = Extraction::default();

    for spec in fields {
        if extraction.fault.is_some() {
            extraction
                .values
                .insert(spec.name, ExtractionOutcome::missing());
            continue;
        }

        match resolve_field(guard, scope, spec).await {
            Ok(outcome) => {
                match outcome.matched_candidate {
                    Some(index) => {
                        tracing::debug!(%phase, field = %spec.name, candidate = index, "Field resolved")
                    }
                    None => tracing::debug!(%phase, field = %spec.name, "Field unresolved"),
                }
                extraction.values.insert(spec.name, outcome);
            }
            Err(e) => {
                tracing::warn!(%phase, field = %spec.name, error = %e, "Extraction truncated");
                extraction
                    .values
                    .insert(spec.name, ExtractionOutcome::missing());
                extraction.fault = Some(e);
            }
        }
    }

    extraction
}
