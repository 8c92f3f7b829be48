use crate::error::{AppError, FaultKind};
use crate::fields::{Candidate, ExtractionMode, FieldSpec};
use crate::guard::PageGuard;
use crate::models::ExtractionOutcome;
use crate::traits::PageScope;

/// Resolves one field by trying its candidates in order.
///
/// The first candidate whose trimmed value is non-empty and survives the
/// field transform wins, even if a later candidate would also match.
/// Transient faults move on to the next candidate. Terminal and unknown
/// faults stop the chain and are returned to the caller.
pub async fn resolve_field<S: PageScope>(
    guard: &PageGuard,
    scope: &S,
    spec: &FieldSpec,
) -> Result<ExtractionOutcome, AppError> {
    for (index, candidate) in spec.candidates.iter().enumerate() {
        match read_candidate(guard, scope, candidate).await {
            Ok(raw) => {
                if let Some(value) = spec.normalize(&raw) {
                    return Ok(ExtractionOutcome::matched(value, index));
                }
                tracing::trace!(
                    field = %spec.name,
                    index,
                    raw = %raw,
                    "Candidate value rejected by transform"
                );
            }
            Err(e) if e.fault_kind() == FaultKind::Transient => {
                tracing::trace!(field = %spec.name, index, error = %e, "Candidate failed");
            }
            Err(e) => return Err(e),
        }
    }
    Ok(ExtractionOutcome::missing())
}

/// Reads one candidate. Absent elements and empty values are reported as
/// `CandidateNotFound`.
async fn read_candidate<S: PageScope>(
    guard: &PageGuard,
    scope: &S,
    candidate: &Candidate,
) -> Result<String, AppError> {
    let locator = &candidate.locator;

    if !guard.probe("exists", scope.exists(locator)).await? {
        return Err(AppError::CandidateNotFound(locator.to_string()));
    }

    let raw = match &candidate.mode {
        ExtractionMode::Text => guard.probe("read_text", scope.read_text(locator)).await?,
        ExtractionMode::Attribute { name } => {
            guard
                .probe("read_attribute", scope.read_attribute(locator, name))
                .await?
        }
        ExtractionMode::MetaContent => {
            guard
                .probe("read_meta", scope.read_attribute(locator, "content"))
                .await?
        }
    };

    raw.map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .ok_or_else(|| AppError::CandidateNotFound(format!("{locator} (empty)")))
}
