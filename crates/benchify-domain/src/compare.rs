use crate::DomainError;
use benchify_types::Relative;

/// A tool with a measured outcome for one test, in declaration order.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Candidate<'a> {
    pub tool: &'a str,
    pub mean: f64,
}

/// Pick the baseline for one test.
///
/// The configured main tool wins if it was measured; otherwise the lowest mean,
/// with ties going to the earlier-declared tool.
pub fn resolve_main_tool<'a>(
    configured: Option<&str>,
    candidates: &[Candidate<'a>],
) -> Option<&'a str> {
    if let Some(name) = configured
        && let Some(c) = candidates.iter().find(|c| c.tool == name)
    {
        return Some(c.tool);
    }
    let mut best: Option<&Candidate<'a>> = None;
    for c in candidates {
        match best {
            Some(b) if c.mean >= b.mean => {}
            _ => best = Some(c),
        }
    }
    best.map(|c| c.tool)
}

/// Express `mean` relative to the baseline mean.
pub fn relative_to(main_mean: f64, mean: f64) -> Result<Relative, DomainError> {
    if main_mean.is_nan() || main_mean <= 0.0 {
        return Err(DomainError::InvalidBaseline(main_mean));
    }
    Ok(Relative {
        ratio: mean / main_mean,
        pct: (mean - main_mean) / main_mean,
    })
}
