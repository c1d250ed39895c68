/// Error listing every missing prerequisite at once.
#[derive(Debug, thiserror::Error)]
#[error("missing prerequisites: {0}")]
pub struct PrerequisiteError(String);

/// Verify that the commands the driver shells out to are on PATH.
///
/// Collects all failures into a single error so the operator sees the
/// complete list instead of fixing one at a time.
pub fn check_prerequisites() -> Result<(), PrerequisiteError> {
    let mut errors = Vec::new();

    for cmd in ["ip", "iptables"] {
        if which::which(cmd).is_err() {
            errors.push(format!("required command not found: {cmd}"));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(PrerequisiteError(errors.join("; ")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failures_name_the_missing_command() {
        // Not every dev machine carries iptables; only check that a
        // failure, when it happens, names what is missing.
        if let Err(e) = check_prerequisites() {
            assert!(e.to_string().contains("required command not found"));
        }
    }
}
