//! The health evaluator (spec §4.2): a pure mapping from a container
//! summary to `(healthy, status_label)`. It never errs — missing data
//! yields `not_found` (spec §7).

use crate::docker::ContainerSummary;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HealthObservation {
    pub healthy: bool,
    pub label: String,
}

impl HealthObservation {
    fn healthy(label: impl Into<String>) -> Self {
        Self {
            healthy: true,
            label: label.into(),
        }
    }

    fn unhealthy(label: impl Into<String>) -> Self {
        Self {
            healthy: false,
            label: label.into(),
        }
    }
}

/// Evaluates the health of a single target given its latest summary, or
/// `None` if the runtime listing did not return the target at all.
pub fn evaluate(summary: Option<&ContainerSummary>) -> HealthObservation {
    let Some(summary) = summary else {
        return HealthObservation::unhealthy("not_found");
    };

    match summary.state.as_str() {
        "running" => match summary.health.as_deref() {
            None => HealthObservation::healthy("running_no_healthcheck"),
            Some("healthy") => HealthObservation::healthy("healthy"),
            Some("starting") => HealthObservation::healthy("starting"),
            Some("unhealthy") => HealthObservation::unhealthy("unhealthy"),
            Some(other) => HealthObservation::unhealthy(format!("unknown({other})")),
        },
        "restarting" => HealthObservation::unhealthy("restarting"),
        other => {
            if summary.status.is_empty() {
                HealthObservation::unhealthy(format!("not_running(state={other})"))
            } else {
                HealthObservation::unhealthy(format!(
                    "not_running(state={other},status={})",
                    summary.status
                ))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn summary(state: &str, health: Option<&str>, status: &str) -> ContainerSummary {
        ContainerSummary {
            id: "id".into(),
            name: "target".into(),
            image: "image".into(),
            state: state.into(),
            status: status.into(),
            health: health.map(String::from),
        }
    }

    #[test]
    fn absent_container_is_not_found() {
        let obs = evaluate(None);
        assert!(!obs.healthy);
        assert_eq!(obs.label, "not_found");
    }

    #[rstest]
    #[case::no_healthcheck(summary("running", None, "Up 2m"), true, "running_no_healthcheck")]
    #[case::healthy(summary("running", Some("healthy"), "Up 2m (healthy)"), true, "healthy")]
    #[case::starting(summary("running", Some("starting"), "Up 2m (starting)"), true, "starting")]
    #[case::unhealthy(summary("running", Some("unhealthy"), "Up 2m (unhealthy)"), false, "unhealthy")]
    #[case::unknown_health(summary("running", Some("weird"), "Up 2m"), false, "unknown(weird)")]
    #[case::restarting(summary("restarting", None, ""), false, "restarting")]
    #[case::exited_with_status(summary("exited", None, "Exited (1) 2m ago"), false, "not_running(state=exited,status=Exited (1) 2m ago)")]
    #[case::exited_without_status(summary("exited", None, ""), false, "not_running(state=exited)")]
    fn truth_table(#[case] summary: ContainerSummary, #[case] healthy: bool, #[case] label: &str) {
        let obs = evaluate(Some(&summary));
        assert_eq!(obs.healthy, healthy);
        assert_eq!(obs.label, label);
    }
}
