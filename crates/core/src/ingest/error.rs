use std::fmt;

/// Why ingestion found no dated snapshot. Carries one reason per strategy that was tried.
#[derive(Debug, Clone)]
pub struct ParseDiagnosticsError {
    pub attempts: Vec<StrategyFailure>,
    pub excerpt: String,
}

#[derive(Debug, Clone)]
pub struct StrategyFailure {
    pub strategy: &'static str,
    pub detail: String,
}

impl fmt::Display for ParseDiagnosticsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "no dated snapshot found in input")?;
        for attempt in &self.attempts {
            write!(f, "; {}: {}", attempt.strategy, attempt.detail)?;
        }
        Ok(())
    }
}

impl std::error::Error for ParseDiagnosticsError {}
