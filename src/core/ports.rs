//! Port Allocator (C3): assigns ports to new services and fails fast on
//! collisions; also owns cross-type service-name validation, since a name
//! must be checked against the opposite type's map before a port is ever
//! handed out (spec §4.3).

use crate::core::error::EggError;
use crate::core::manifest::Project;
use std::collections::BTreeSet;

const BACKEND_HTTP_BASE: u16 = 8080;
const BACKEND_METRICS_BASE: u16 = 9090;
const FRONTEND_WEB_BASE: u16 = 3000;
const OFFSET_STEP: u16 = 10;
const MAX_ATTEMPTS: u16 = 2000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortCategory {
    BackendHttp,
    BackendHealth,
    BackendMetrics,
    FrontendWeb,
}

fn all_backend_ports(project: &Project) -> BTreeSet<u16> {
    project
        .backend
        .values()
        .flat_map(|s| s.ports.as_triple())
        .collect()
}

fn all_frontend_ports(project: &Project) -> BTreeSet<u16> {
    project.frontend.values().map(|s| s.web_port).collect()
}

/// Verifies `candidate_id` is not already used by the opposite service
/// type (spec §4.3, invariant 1/P1). Must be called before port
/// assignment, per the component's contract.
pub fn validate_cross_type_name(project: &Project, candidate_id: &str, is_backend: bool) -> Result<(), EggError> {
    let collides = if is_backend {
        project.frontend.contains_key(candidate_id)
    } else {
        project.backend.contains_key(candidate_id)
    };
    if collides {
        return Err(EggError::NameTaken(candidate_id.to_string()));
    }
    if (is_backend && project.backend.contains_key(candidate_id))
        || (!is_backend && project.frontend.contains_key(candidate_id))
    {
        return Err(EggError::NameTaken(candidate_id.to_string()));
    }
    Ok(())
}

/// Allocates a fresh `(http, health, metrics)` triple such that no
/// component collides with any existing backend's ports, advancing by
/// `OFFSET_STEP` until three free numbers are found (spec §4.3). Never
/// returns 0, never repeats a port already handed out in this project.
pub fn allocate_backend(project: &Project) -> Result<(u16, u16, u16), EggError> {
    let used = all_backend_ports(project);

    for attempt in 0..MAX_ATTEMPTS {
        let http = BACKEND_HTTP_BASE + attempt * OFFSET_STEP;
        let health = http + 1;
        let metrics = BACKEND_METRICS_BASE + attempt * OFFSET_STEP;

        if metrics == http || metrics == health {
            continue;
        }
        if !used.contains(&http) && !used.contains(&health) && !used.contains(&metrics) {
            return Ok((http, health, metrics));
        }
    }
    Err(EggError::Validation(
        "exhausted port search space allocating a backend ports triple".into(),
    ))
}

/// Allocates a frontend `web_port` not used by any existing frontend.
pub fn allocate_frontend(project: &Project) -> Result<u16, EggError> {
    let used = all_frontend_ports(project);
    for attempt in 0..MAX_ATTEMPTS {
        let candidate = FRONTEND_WEB_BASE + attempt * OFFSET_STEP;
        if !used.contains(&candidate) {
            return Ok(candidate);
        }
    }
    Err(EggError::Validation(
        "exhausted port search space allocating a frontend web_port".into(),
    ))
}

/// Validates that an operator-supplied port is not yet taken in its
/// category; returns `PortInUse` otherwise.
pub fn reserve_explicit(project: &Project, port: u16, category: PortCategory) -> Result<(), EggError> {
    let taken = match category {
        PortCategory::BackendHttp | PortCategory::BackendHealth | PortCategory::BackendMetrics => {
            all_backend_ports(project).contains(&port)
        }
        PortCategory::FrontendWeb => all_frontend_ports(project).contains(&port),
    };
    if taken {
        return Err(EggError::PortInUse(port));
    }
    Ok(())
}
