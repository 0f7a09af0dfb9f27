//! Table definitions.
//!
//! Uniqueness rules that the engine depends on live in the schema itself:
//! one pending ownership request per place, one active claim token per place,
//! one subscription row per place, and the payment idempotency triple.

pub(crate) const SCHEMA: &str = r"
    CREATE TABLE IF NOT EXISTS general_services (
        id INTEGER PRIMARY KEY,
        name TEXT NOT NULL UNIQUE
    );

    CREATE TABLE IF NOT EXISTS places (
        id INTEGER PRIMARY KEY,
        service_id INTEGER NOT NULL REFERENCES general_services(id),
        name TEXT NOT NULL,
        description TEXT NOT NULL DEFAULT '',
        address TEXT NOT NULL DEFAULT '',
        is_published INTEGER NOT NULL DEFAULT 0,
        business_enabled INTEGER NOT NULL DEFAULT 0,
        is_verified INTEGER NOT NULL DEFAULT 0,
        verified_tier TEXT,
        verified_until TEXT,
        created_at TEXT NOT NULL
    );

    CREATE INDEX IF NOT EXISTS idx_places_service
    ON places(service_id);

    CREATE TABLE IF NOT EXISTS business_owners (
        id INTEGER PRIMARY KEY,
        place_id INTEGER NOT NULL REFERENCES places(id),
        tg_user_id INTEGER NOT NULL,
        role TEXT NOT NULL DEFAULT 'owner',
        status TEXT NOT NULL CHECK (status IN ('pending', 'approved', 'rejected')),
        created_at TEXT NOT NULL,
        approved_at TEXT,
        approved_by INTEGER
    );

    CREATE UNIQUE INDEX IF NOT EXISTS idx_business_owners_one_pending
    ON business_owners(place_id) WHERE status = 'pending';

    CREATE INDEX IF NOT EXISTS idx_business_owners_user
    ON business_owners(tg_user_id, status);

    CREATE TABLE IF NOT EXISTS business_subscriptions (
        place_id INTEGER PRIMARY KEY REFERENCES places(id),
        tier TEXT NOT NULL DEFAULT 'free'
            CHECK (tier IN ('free', 'light', 'pro', 'partner')),
        status TEXT NOT NULL DEFAULT 'inactive'
            CHECK (status IN ('inactive', 'active', 'past_due', 'canceled')),
        starts_at TEXT,
        expires_at TEXT,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    );

    CREATE INDEX IF NOT EXISTS idx_business_subscriptions_status
    ON business_subscriptions(status, expires_at);

    CREATE TABLE IF NOT EXISTS business_claim_tokens (
        id INTEGER PRIMARY KEY,
        place_id INTEGER NOT NULL REFERENCES places(id),
        token TEXT NOT NULL UNIQUE,
        status TEXT NOT NULL CHECK (status IN ('active', 'used', 'revoked')),
        attempts_left INTEGER NOT NULL DEFAULT 5 CHECK (attempts_left >= 0),
        created_at TEXT NOT NULL,
        expires_at TEXT,
        created_by INTEGER,
        used_at TEXT,
        used_by INTEGER
    );

    CREATE UNIQUE INDEX IF NOT EXISTS idx_business_claim_tokens_one_active
    ON business_claim_tokens(place_id) WHERE status = 'active';

    CREATE TABLE IF NOT EXISTS business_payment_events (
        id INTEGER PRIMARY KEY,
        place_id INTEGER NOT NULL REFERENCES places(id),
        provider TEXT NOT NULL,
        external_payment_id TEXT NOT NULL,
        event_type TEXT NOT NULL,
        tier TEXT NOT NULL,
        amount INTEGER NOT NULL DEFAULT 0,
        currency TEXT NOT NULL,
        status TEXT NOT NULL,
        raw_payload TEXT,
        created_at TEXT NOT NULL,
        UNIQUE (provider, external_payment_id, event_type)
    );

    CREATE INDEX IF NOT EXISTS idx_business_payment_events_place
    ON business_payment_events(place_id, created_at);

    CREATE TABLE IF NOT EXISTS business_audit_log (
        id INTEGER PRIMARY KEY,
        place_id INTEGER NOT NULL,
        actor_tg_user_id INTEGER,
        action TEXT NOT NULL,
        payload_json TEXT NOT NULL DEFAULT '{}',
        created_at TEXT NOT NULL
    );

    CREATE INDEX IF NOT EXISTS idx_business_audit_log_place
    ON business_audit_log(place_id, id);

    CREATE TRIGGER IF NOT EXISTS business_audit_log_no_update
    BEFORE UPDATE ON business_audit_log
    BEGIN
        SELECT RAISE(ABORT, 'audit log is append-only');
    END;

    CREATE TRIGGER IF NOT EXISTS business_audit_log_no_delete
    BEFORE DELETE ON business_audit_log
    BEGIN
        SELECT RAISE(ABORT, 'audit log is append-only');
    END;
";
