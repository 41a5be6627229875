//! Tenant identification.
//!
//! The server does not authenticate anyone. It sits behind an identity layer that authenticates the caller and sets
//! the tenant header (`X-Tenant-Id` unless configured otherwise). Every data-bearing route takes a [`Tenant`], so a
//! request without the header never reaches a handler.
use std::future::{ready, Ready};

use actix_web::{dev::Payload, web, FromRequest, HttpRequest};
use log::debug;
use tally_engine::db_types::TenantId;

use crate::{
    config::{ServerOptions, DEFAULT_TENANT_HEADER},
    errors::ServerError,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tenant(pub TenantId);

impl Tenant {
    pub fn id(&self) -> &TenantId {
        &self.0
    }

    pub fn into_inner(self) -> TenantId {
        self.0
    }
}

impl FromRequest for Tenant {
    type Error = ServerError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        let header = req
            .app_data::<web::Data<ServerOptions>>()
            .map(|o| o.tenant_header.as_str())
            .unwrap_or(DEFAULT_TENANT_HEADER);
        let tenant = req
            .headers()
            .get(header)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| Tenant(TenantId::from(s)));
        match tenant {
            Some(t) => ready(Ok(t)),
            None => {
                debug!("💻️ Rejected request to {} without a {header} header", req.path());
                ready(Err(ServerError::MissingTenant(header.to_string())))
            },
        }
    }
}
