//! The access gate and the configurable policy behind it.

use crate::{AuthError, Permission, Result};
use gitgate_git::Service;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// What the gate sees of a request. Built from headers only; the body is
/// never available at this point.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccessRequest<'a> {
    /// Service name as sent, `upload-pack` or `git-upload-pack` style.
    pub service: &'a str,
    /// Repository name from the URL.
    pub repository: &'a str,
    /// `Content-Type` of the request.
    pub content_type: Option<&'a str>,
    /// Caller identity, when one was presented.
    pub identity: Option<&'a str>,
    /// Whether the content type must match the service's RPC request type.
    pub require_content_type: bool,
}

impl<'a> AccessRequest<'a> {
    /// Creates an anonymous request without a content-type check.
    pub fn new(service: &'a str, repository: &'a str) -> Self {
        Self {
            service,
            repository,
            content_type: None,
            identity: None,
            require_content_type: false,
        }
    }

    /// Sets the caller identity.
    pub fn with_identity(mut self, identity: Option<&'a str>) -> Self {
        self.identity = identity;
        self
    }

    /// Requires the content type to be `application/x-git-<service>-request`.
    pub fn with_content_type_check(mut self, content_type: Option<&'a str>) -> Self {
        self.content_type = content_type;
        self.require_content_type = true;
        self
    }
}

/// Decides whether a smart HTTP request may proceed.
pub trait AccessGate: Send + Sync {
    /// Checks a request, returning why it was refused.
    fn check(&self, request: &AccessRequest<'_>) -> Result<()>;

    /// Binary form of [`check`](Self::check).
    fn is_authorized(&self, request: &AccessRequest<'_>) -> bool {
        self.check(request).is_ok()
    }
}

/// Serializable policy settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AccessConfig {
    /// Serve fetch and clone.
    pub upload_pack: bool,
    /// Serve push.
    pub receive_pack: bool,
    /// Permission of callers without a grant.
    pub default_permission: Permission,
    /// Per-identity grants.
    pub users: HashMap<String, Permission>,
}

impl Default for AccessConfig {
    fn default() -> Self {
        Self {
            upload_pack: true,
            receive_pack: true,
            default_permission: Permission::Write,
            users: HashMap::new(),
        }
    }
}

/// Gate driven by per-service switches and per-identity grants.
///
/// Checks run in this order: known service, content type (when required),
/// service switch, then the caller's permission against what the service
/// needs (`Read` for upload-pack, `Write` for receive-pack).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServicePolicy {
    upload_pack: bool,
    receive_pack: bool,
    default_permission: Permission,
    grants: HashMap<String, Permission>,
}

impl Default for ServicePolicy {
    fn default() -> Self {
        Self::from_config(&AccessConfig::default())
    }
}

impl ServicePolicy {
    /// Creates a policy with both services on and full access for everyone.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a policy from configuration.
    pub fn from_config(config: &AccessConfig) -> Self {
        Self {
            upload_pack: config.upload_pack,
            receive_pack: config.receive_pack,
            default_permission: config.default_permission,
            grants: config.users.clone(),
        }
    }

    /// Switches upload-pack on or off.
    pub fn with_upload_pack(mut self, enabled: bool) -> Self {
        self.upload_pack = enabled;
        self
    }

    /// Switches receive-pack on or off.
    pub fn with_receive_pack(mut self, enabled: bool) -> Self {
        self.receive_pack = enabled;
        self
    }

    /// Sets the permission of callers without a grant.
    pub fn with_default_permission(mut self, permission: Permission) -> Self {
        self.default_permission = permission;
        self
    }

    /// Grants `permission` to `identity`.
    pub fn grant(mut self, identity: impl Into<String>, permission: Permission) -> Self {
        self.grants.insert(identity.into(), permission);
        self
    }

    /// Effective permission of a caller.
    pub fn permission_for(&self, identity: Option<&str>) -> Permission {
        identity
            .and_then(|id| self.grants.get(id).copied())
            .unwrap_or(self.default_permission)
    }

    fn enabled(&self, service: Service) -> bool {
        match service {
            Service::UploadPack => self.upload_pack,
            Service::ReceivePack => self.receive_pack,
        }
    }
}

fn required_permission(service: Service) -> Permission {
    match service {
        Service::UploadPack => Permission::Read,
        Service::ReceivePack => Permission::Write,
    }
}

impl AccessGate for ServicePolicy {
    fn check(&self, request: &AccessRequest<'_>) -> Result<()> {
        let service: Service = request
            .service
            .parse()
            .map_err(|_| AuthError::UnknownService(request.service.to_string()))?;

        if request.require_content_type {
            let expected = service.request_content_type();
            if request.content_type != Some(expected.as_str()) {
                return Err(AuthError::ContentType {
                    actual: request.content_type.map(str::to_string),
                    expected,
                });
            }
        }

        if !self.enabled(service) {
            return Err(AuthError::ServiceDisabled(service.to_string()));
        }

        let granted = self.permission_for(request.identity);
        let required = required_permission(service);
        if !granted.has(required) {
            return Err(AuthError::PermissionDenied(format!(
                "{} needs {} on {}, caller has {}",
                service, required, request.repository, granted
            )));
        }

        tracing::trace!(
            service = %service,
            repo = request.repository,
            identity = request.identity.unwrap_or("-"),
            "Access granted"
        );
        Ok(())
    }
}
