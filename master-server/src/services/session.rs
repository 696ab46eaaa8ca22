//! Session Service
//!
//! Login, logout, refresh and the per-request validation hot path.
//!
//! A credential is valid while its signature and expiry hold, no revocation
//! marker exists for its `jti`, its embedded password version equals the
//! principal's current one, and the principal still has a session record.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::OnceCell;

use shared::models::{
    CheckExpiryResponse, LoginRequest, LoginResponse, Principal, RefreshRequest, SessionRecord,
    TokenPair,
};
use shared::util::now_millis;

use super::authorization::{AuthzService, Grants, load_grants};
use super::{acquire, best_effort};
use crate::auth::{Claims, CurrentUser, IssuedPair, JwtService, PasswordError, PasswordHasher, TokenSubject};
use crate::db::DbService;
use crate::db::repository::principal;
use crate::session::SessionStore;
use crate::utils::validation::{
    MAX_EMAIL_LEN, normalize_email, validate_id, validate_password_present,
    validate_required_text,
};
use crate::{AppError, AppResult, RequestContext, security_log};

pub struct SessionService {
    db: DbService,
    store: Arc<dyn SessionStore>,
    hasher: PasswordHasher,
    jwt: Arc<JwtService>,
    authz: Arc<AuthzService>,
    /// Hash verified against on an unknown identifier so misses cost the same
    decoy_hash: OnceCell<String>,
}

const DECOY_PASSWORD: &str = "decoy-password-never-assigned";

impl SessionService {
    pub fn new(
        db: DbService,
        store: Arc<dyn SessionStore>,
        hasher: PasswordHasher,
        jwt: Arc<JwtService>,
        authz: Arc<AuthzService>,
    ) -> Self {
        Self {
            db,
            store,
            hasher,
            jwt,
            authz,
            decoy_hash: OnceCell::new(),
        }
    }

    fn access_ttl(&self) -> Duration {
        self.jwt.config.access_ttl()
    }

    fn refresh_ttl(&self) -> Duration {
        self.jwt.config.refresh_ttl()
    }

    // ── Internal helpers ─────────────────────────────────────────────

    /// Username first, then email
    async fn locate(&self, identifier: &str) -> AppResult<Option<Principal>> {
        let mut conn = acquire(&self.db).await?;
        if let Some(p) = principal::find_by_username(&mut conn, identifier).await? {
            return Ok(Some(p));
        }
        if identifier.contains('@') {
            let email = normalize_email(identifier);
            return Ok(principal::find_by_email(&mut conn, &email).await?);
        }
        Ok(None)
    }

    /// Spend one argon2 verification on a login miss
    async fn verify_decoy(&self, password: &str) {
        let hash = self
            .decoy_hash
            .get_or_try_init(|| self.hasher.hash(DECOY_PASSWORD))
            .await;
        match hash {
            Ok(hash) => {
                let _ = self.hasher.verify(password, hash).await;
            }
            Err(e) => tracing::warn!(error = %e, "Decoy hash unavailable"),
        }
    }

    async fn load_live(&self, id: i64) -> AppResult<Option<(Principal, Grants)>> {
        let mut conn = acquire(&self.db).await?;
        let Some(p) = principal::find_by_id(&mut conn, id).await? else {
            return Ok(None);
        };
        let grants = load_grants(&mut conn, id).await?;
        Ok(Some((p, grants)))
    }

    /// Current password version: cache first, Principal Store on a miss or
    /// when the cache lags behind `seen` (a version carried by a credential).
    /// `None` once the principal is gone.
    async fn current_version(&self, principal_id: i64, seen: i64) -> AppResult<Option<i64>> {
        match self.store.get_password_version(principal_id).await {
            Ok(Some(cached)) if cached >= seen => return Ok(Some(cached)),
            Ok(_) => {}
            Err(e) => {
                tracing::warn!(principal_id, error = %e, "Password version cache read failed, using store");
            }
        }

        let version = {
            let mut conn = acquire(&self.db).await?;
            principal::get_password_version(&mut conn, principal_id).await?
        };
        if let Some(v) = version {
            best_effort(
                "password version cache fill",
                principal_id,
                self.store
                    .store_password_version(principal_id, v, self.access_ttl())
                    .await,
            );
        }
        Ok(version)
    }

    async fn record_login(&self, id: i64, at: i64, ip: Option<&str>) -> AppResult<()> {
        let mut conn = acquire(&self.db).await?;
        principal::update_last_login(&mut conn, id, at, ip).await?;
        Ok(())
    }

    fn issue(&self, p: &Principal, grants: &Grants) -> AppResult<IssuedPair> {
        Ok(self.jwt.issue_pair(&TokenSubject {
            principal_id: p.id,
            username: &p.username,
            roles: &grants.roles,
            permissions: &grants.permissions,
            password_version: p.password_version,
        })?)
    }

    fn token_pair(pair: IssuedPair) -> TokenPair {
        TokenPair {
            access_token: pair.access_token,
            refresh_token: pair.refresh_token,
            token_type: "Bearer".to_string(),
            expires_in: pair.expires_in,
        }
    }

    /// Shared by `validate_session` and `logout_all`
    async fn validate_inner(&self, access_token: &str) -> AppResult<(Claims, SessionRecord)> {
        let claims = self.jwt.parse_access(access_token)?;
        let principal_id = claims.principal_id()?;

        if self.store.is_revoked(&claims.jti).await? {
            return Err(AppError::token_revoked());
        }

        let Some(current) = self.current_version(principal_id, claims.pwd_ver).await? else {
            return Err(AppError::session_expired());
        };
        // Lag has been repaired above, so any mismatch is final
        if claims.pwd_ver != current {
            security_log!(
                "WARN",
                "stale_credential",
                principal_id = principal_id,
                token_version = claims.pwd_ver,
                current_version = current
            );
            return Err(AppError::token_stale());
        }

        let Some(record) = self.store.get_session(principal_id).await? else {
            return Err(AppError::session_expired());
        };
        Ok((claims, record))
    }

    // ── Public operations ────────────────────────────────────────────

    /// Authenticate by username or email and open a session
    pub async fn login(&self, ctx: &RequestContext, req: LoginRequest) -> AppResult<LoginResponse> {
        ctx.guard(async {
            validate_required_text(&req.username, "username", MAX_EMAIL_LEN)?;
            validate_password_present(&req.password, "password")?;
            let identifier = req.username.trim();

            let Some(p) = self.locate(identifier).await? else {
                self.verify_decoy(&req.password).await;
                security_log!(
                    "WARN",
                    "login_failed",
                    reason = "unknown_principal",
                    identifier = identifier,
                    client_ip = ctx.client_ip.as_deref().unwrap_or("-")
                );
                return Err(AppError::invalid_credentials());
            };
            if !p.status.is_enabled() {
                security_log!(
                    "WARN",
                    "login_failed",
                    reason = "account_disabled",
                    principal_id = p.id,
                    client_ip = ctx.client_ip.as_deref().unwrap_or("-")
                );
                return Err(AppError::account_disabled());
            }

            let verified = match self.hasher.verify(&req.password, &p.password_hash).await {
                Ok(ok) => ok,
                // Placeholder hash of an account that never got a password
                Err(PasswordError::MalformedHash(_)) => false,
                Err(e) => return Err(e.into()),
            };
            if !verified {
                security_log!(
                    "WARN",
                    "login_failed",
                    reason = "bad_password",
                    principal_id = p.id,
                    client_ip = ctx.client_ip.as_deref().unwrap_or("-")
                );
                return Err(AppError::invalid_credentials());
            }

            let grants = {
                let mut conn = acquire(&self.db).await?;
                load_grants(&mut conn, p.id).await?
            };
            let pair = self.issue(&p, &grants)?;

            let now = now_millis();
            if let Err(e) = self.record_login(p.id, now, ctx.client_ip.as_deref()).await {
                tracing::warn!(principal_id = p.id, error = %e, "Last-login update failed, continuing");
            }

            let record = SessionRecord {
                principal_id: p.id,
                username: p.username.clone(),
                email: p.email.clone(),
                roles: grants.roles.clone(),
                permissions: grants.permissions.clone(),
                login_at: now,
                last_active_at: now,
                client_ip: ctx.client_ip.clone(),
                user_agent: ctx.user_agent.clone(),
                access_jti: pair.access_jti.clone(),
                refresh_jti: pair.refresh_jti.clone(),
                password_version: p.password_version,
            };
            self.store.store_session(&record, self.access_ttl()).await?;
            best_effort(
                "password version cache write",
                p.id,
                self.store
                    .store_password_version(p.id, p.password_version, self.access_ttl())
                    .await,
            );

            security_log!(
                "INFO",
                "login_succeeded",
                principal_id = p.id,
                username = p.username.as_str(),
                client_ip = ctx.client_ip.as_deref().unwrap_or("-"),
                request_id = ctx.request_id.as_str()
            );

            let mut view = p.to_view(grants.roles);
            view.last_login_at = Some(now);
            if ctx.client_ip.is_some() {
                view.last_login_ip = ctx.client_ip.clone();
            }
            Ok(LoginResponse {
                tokens: Self::token_pair(pair),
                principal: view,
            })
        })
        .await
    }

    /// Revoke the presented credential and drop the session.
    ///
    /// Idempotent: an unparseable or already revoked credential still succeeds.
    pub async fn logout(&self, ctx: &RequestContext, access_token: &str) -> AppResult<()> {
        ctx.guard(async {
            let claims = match self.jwt.parse_access_ignoring_expiry(access_token) {
                Ok(c) => c,
                Err(e) => {
                    tracing::info!(error = %e, "Logout with unusable credential ignored");
                    return Ok(());
                }
            };
            let principal_id = claims.principal_id()?;

            self.store
                .mark_revoked(&claims.jti, self.jwt.revocation_ttl(&claims))
                .await?;

            let record = best_effort("session read", principal_id, self.store.get_session(principal_id).await)
                .flatten();
            if let Some(record) = record
                && record.access_jti == claims.jti
            {
                self.store
                    .mark_revoked(&record.refresh_jti, self.refresh_ttl())
                    .await?;
            }
            best_effort(
                "session delete on logout",
                principal_id,
                self.store.delete_session(principal_id).await,
            );

            security_log!(
                "INFO",
                "logout",
                principal_id = principal_id,
                jti = claims.jti.as_str(),
                request_id = ctx.request_id.as_str()
            );
            Ok(())
        })
        .await
    }

    /// Invalidate every credential of the principal by bumping its
    /// password version. Returns the new version.
    pub async fn logout_all(&self, ctx: &RequestContext, access_token: &str) -> AppResult<i64> {
        ctx.guard(async {
            let (claims, _) = self.validate_inner(access_token).await?;
            let principal_id = claims.principal_id()?;

            let version = {
                let mut conn = acquire(&self.db).await?;
                principal::increment_password_version(&mut conn, principal_id).await?
            };

            best_effort(
                "password version cache write",
                principal_id,
                self.store
                    .store_password_version(principal_id, version, self.access_ttl())
                    .await,
            );
            best_effort(
                "session delete on logout-all",
                principal_id,
                self.store.delete_all_sessions_for(principal_id).await,
            );
            best_effort(
                "revocation marker on logout-all",
                principal_id,
                self.store
                    .mark_revoked(&claims.jti, self.jwt.revocation_ttl(&claims))
                    .await,
            );
            self.authz.invalidate(principal_id);

            security_log!(
                "INFO",
                "logout_all",
                principal_id = principal_id,
                password_version = version,
                request_id = ctx.request_id.as_str()
            );
            Ok(version)
        })
        .await
    }

    /// Rotate a refresh credential. The old one is revoked exactly once, so a
    /// replayed refresh credential fails with `TokenRevoked`.
    pub async fn refresh(&self, ctx: &RequestContext, req: RefreshRequest) -> AppResult<TokenPair> {
        ctx.guard(async {
            let claims = self.jwt.parse_refresh(&req.refresh_token)?;
            let principal_id = claims.principal_id()?;

            if self.store.is_revoked(&claims.jti).await? {
                security_log!(
                    "WARN",
                    "refresh_replayed",
                    principal_id = principal_id,
                    jti = claims.jti.as_str()
                );
                return Err(AppError::token_revoked());
            }

            let Some(current) = self.current_version(principal_id, claims.pwd_ver).await? else {
                return Err(AppError::invalid_credentials());
            };
            if claims.pwd_ver != current {
                return Err(AppError::token_stale());
            }

            let Some((p, grants)) = self.load_live(principal_id).await? else {
                return Err(AppError::invalid_credentials());
            };
            if !p.status.is_enabled() {
                return Err(AppError::account_disabled());
            }
            if p.password_version != claims.pwd_ver {
                return Err(AppError::token_stale());
            }

            // Claim the old credential; a concurrent rotation loses here
            if !self
                .store
                .mark_revoked(&claims.jti, self.jwt.revocation_ttl(&claims))
                .await?
            {
                return Err(AppError::token_revoked());
            }

            let pair = self.issue(&p, &grants)?;
            let now = now_millis();
            let existing = best_effort("session read", principal_id, self.store.get_session(principal_id).await)
                .flatten();
            let record = SessionRecord {
                principal_id,
                username: p.username.clone(),
                email: p.email.clone(),
                roles: grants.roles.clone(),
                permissions: grants.permissions.clone(),
                login_at: existing.as_ref().map_or(now, |r| r.login_at),
                last_active_at: now,
                client_ip: ctx
                    .client_ip
                    .clone()
                    .or_else(|| existing.as_ref().and_then(|r| r.client_ip.clone())),
                user_agent: ctx
                    .user_agent
                    .clone()
                    .or_else(|| existing.as_ref().and_then(|r| r.user_agent.clone())),
                access_jti: pair.access_jti.clone(),
                refresh_jti: pair.refresh_jti.clone(),
                password_version: p.password_version,
            };
            self.store.store_session(&record, self.access_ttl()).await?;

            tracing::debug!(principal_id, "Credential pair rotated");
            Ok(Self::token_pair(pair))
        })
        .await
    }

    /// Hot path of every protected request
    pub async fn validate_session(
        &self,
        ctx: &RequestContext,
        access_token: &str,
    ) -> AppResult<CurrentUser> {
        ctx.guard(async {
            let (claims, record) = self.validate_inner(access_token).await?;
            let principal_id = record.principal_id;
            best_effort(
                "session touch",
                principal_id,
                self.store.touch_session(principal_id, self.access_ttl()).await,
            );
            Ok(CurrentUser {
                id: principal_id,
                username: record.username,
                email: record.email,
                roles: record.roles,
                permissions: record.permissions,
                jti: claims.jti,
                password_version: claims.pwd_ver,
                token_exp: claims.exp,
            })
        })
        .await
    }

    /// Remaining lifetime of a valid access credential
    pub async fn check_expiry(
        &self,
        ctx: &RequestContext,
        access_token: &str,
    ) -> AppResult<CheckExpiryResponse> {
        ctx.guard(async {
            let claims = self.jwt.parse_access(access_token)?;
            Ok(CheckExpiryResponse {
                principal_id: claims.principal_id()?,
                expires_at: claims.exp,
                remaining_seconds: claims.remaining_secs(),
            })
        })
        .await
    }

    // ── Administration ───────────────────────────────────────────────

    /// Drop the principal's session and revoke its last known credentials.
    /// Returns whether a session existed.
    pub async fn revoke_session(&self, ctx: &RequestContext, principal_id: i64) -> AppResult<bool> {
        ctx.guard(async {
            validate_id(principal_id, "principal_id")?;
            let Some(record) = self.store.get_session(principal_id).await? else {
                return Ok(false);
            };
            self.store
                .mark_revoked(&record.access_jti, self.access_ttl())
                .await?;
            self.store
                .mark_revoked(&record.refresh_jti, self.refresh_ttl())
                .await?;
            let removed = self.store.delete_session(principal_id).await?;

            security_log!(
                "INFO",
                "session_revoked",
                principal_id = principal_id,
                request_id = ctx.request_id.as_str()
            );
            Ok(removed)
        })
        .await
    }

    /// Same as [`Self::revoke_session`] while sessions are one per principal
    pub async fn revoke_all_sessions(
        &self,
        ctx: &RequestContext,
        principal_id: i64,
    ) -> AppResult<usize> {
        ctx.guard(async {
            validate_id(principal_id, "principal_id")?;
            if let Some(record) = self.store.get_session(principal_id).await? {
                self.store
                    .mark_revoked(&record.access_jti, self.access_ttl())
                    .await?;
                self.store
                    .mark_revoked(&record.refresh_jti, self.refresh_ttl())
                    .await?;
            }
            let removed = self.store.delete_all_sessions_for(principal_id).await?;
            security_log!(
                "INFO",
                "sessions_revoked",
                principal_id = principal_id,
                count = removed as i64,
                request_id = ctx.request_id.as_str()
            );
            Ok(removed)
        })
        .await
    }

    pub async fn list_sessions(
        &self,
        ctx: &RequestContext,
        principal_id: i64,
    ) -> AppResult<Vec<SessionRecord>> {
        ctx.guard(async {
            validate_id(principal_id, "principal_id")?;
            Ok(self
                .store
                .get_session(principal_id)
                .await?
                .into_iter()
                .collect())
        })
        .await
    }
}
