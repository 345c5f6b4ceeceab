use anyhow::{Result, bail};

use crate::autoscaler::Autoscaler;

/// Validate an object or namespace name.
/// Rules: lowercase `[a-z0-9-]`, max 63 chars, no leading/trailing hyphens.
pub fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() {
        bail!("name must not be empty");
    }
    if name.len() > 63 {
        bail!("name '{}' exceeds 63 characters (got {})", name, name.len());
    }
    if name.starts_with('-') || name.ends_with('-') {
        bail!("name '{}' must not start or end with a hyphen", name);
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
    {
        bail!(
            "name '{}' must contain only lowercase letters, digits, and hyphens [a-z0-9-]",
            name
        );
    }
    Ok(())
}

/// Structural checks a store applies before accepting an autoscaler.
///
/// Replica bounds are not checked here; the controller heals them.
pub fn validate_autoscaler(hpa: &Autoscaler) -> Result<()> {
    validate_name(&hpa.metadata.name)?;
    if !hpa.metadata.namespace.is_empty() {
        validate_name(&hpa.metadata.namespace)?;
    }
    let target = &hpa.spec.scale_target_ref;
    if target.kind.is_empty() {
        bail!("autoscaler '{}': scaleTargetRef.kind must be set", hpa.metadata.name);
    }
    validate_name(&target.name)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::autoscaler::{AutoscalerSpec, CrossVersionObjectReference};

    #[test]
    fn valid_names() {
        assert!(validate_name("web").is_ok());
        assert!(validate_name("mem-hpa-1").is_ok());
        assert!(validate_name("a").is_ok());
    }

    #[test]
    fn invalid_names() {
        assert!(validate_name("").is_err());
        assert!(validate_name("Web").is_err());
        assert!(validate_name("mem_hpa").is_err());
        assert!(validate_name("-leading").is_err());
        assert!(validate_name("trailing-").is_err());
        assert!(validate_name(&"a".repeat(64)).is_err());
    }

    #[test]
    fn autoscaler_needs_a_target() {
        let mut hpa = Autoscaler::new(
            "prod",
            "web",
            AutoscalerSpec {
                scale_target_ref: CrossVersionObjectReference {
                    kind: "Deployment".to_string(),
                    name: "web".to_string(),
                    api_version: None,
                },
                max_replicas: 4,
                ..Default::default()
            },
        );
        assert!(validate_autoscaler(&hpa).is_ok());

        hpa.spec.scale_target_ref.kind.clear();
        assert!(validate_autoscaler(&hpa).is_err());
    }
}
