//! Table definitions. Applied with `CREATE ... IF NOT EXISTS`, so running
//! the migration against an existing database is a no-op.

use rusqlite::Connection;

pub(crate) fn migrate(conn: &Connection) -> crate::Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS leads (
            id TEXT PRIMARY KEY,
            name TEXT,
            email TEXT,
            phone TEXT,
            company TEXT,
            sender_id TEXT,
            score INTEGER NOT NULL DEFAULT 0,
            category TEXT NOT NULL,
            status TEXT NOT NULL,
            source TEXT NOT NULL,
            campaign_id TEXT,
            follow_up_count INTEGER NOT NULL DEFAULT 0,
            last_activity_at TEXT NOT NULL,
            nurturing_started_at TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS lead_classifications (
            id TEXT PRIMARY KEY,
            lead_id TEXT NOT NULL,
            score INTEGER NOT NULL,
            category TEXT NOT NULL,
            reasoning TEXT NOT NULL,
            recommended_action TEXT NOT NULL,
            ai_model TEXT NOT NULL,
            created_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS lead_intents (
            id TEXT PRIMARY KEY,
            lead_id TEXT NOT NULL,
            message_id TEXT,
            primary_intent TEXT NOT NULL,
            secondary_intents TEXT NOT NULL,
            confidence REAL NOT NULL,
            entities TEXT NOT NULL,
            created_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS sentiment_analyses (
            id TEXT PRIMARY KEY,
            lead_id TEXT,
            customer_id TEXT,
            message_id TEXT,
            sentiment TEXT NOT NULL,
            score REAL NOT NULL,
            confidence REAL NOT NULL,
            emotions TEXT NOT NULL,
            urgency TEXT NOT NULL,
            churn_risk REAL NOT NULL,
            ai_model TEXT NOT NULL,
            created_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS customers (
            id TEXT PRIMARY KEY,
            lead_id TEXT,
            name TEXT,
            email TEXT,
            phone TEXT,
            company TEXT,
            job_title TEXT,
            location TEXT,
            predicted_clv REAL NOT NULL DEFAULT 0,
            purchasing_power TEXT,
            interests TEXT NOT NULL DEFAULT '[]',
            segment TEXT NOT NULL,
            total_purchases INTEGER NOT NULL DEFAULT 0,
            total_spent REAL NOT NULL DEFAULT 0,
            avg_order_value REAL NOT NULL DEFAULT 0,
            status TEXT NOT NULL,
            churn_risk_score REAL NOT NULL DEFAULT 0,
            merged_into TEXT,
            enriched_at TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS conversations (
            id TEXT PRIMARY KEY,
            lead_id TEXT,
            customer_id TEXT,
            channel TEXT NOT NULL,
            status TEXT NOT NULL,
            message_count INTEGER NOT NULL DEFAULT 0,
            avg_sentiment_score REAL,
            bot_handled INTEGER NOT NULL DEFAULT 1,
            escalated INTEGER NOT NULL DEFAULT 0,
            escalation_reason TEXT,
            started_at TEXT NOT NULL,
            last_message_at TEXT NOT NULL,
            closed_at TEXT
        );

        CREATE TABLE IF NOT EXISTS messages (
            id TEXT PRIMARY KEY,
            conversation_id TEXT NOT NULL,
            content TEXT NOT NULL,
            sender TEXT NOT NULL,
            direction TEXT NOT NULL,
            intent TEXT,
            sentiment TEXT,
            sentiment_score REAL,
            created_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS raw_messages (
            id TEXT PRIMARY KEY,
            channel TEXT NOT NULL,
            sender_id TEXT NOT NULL,
            content TEXT NOT NULL,
            payload TEXT NOT NULL,
            processed INTEGER NOT NULL DEFAULT 0,
            processing_error TEXT,
            received_at TEXT NOT NULL,
            processed_at TEXT
        );

        CREATE TABLE IF NOT EXISTS cases (
            id TEXT PRIMARY KEY,
            conversation_id TEXT,
            lead_id TEXT,
            customer_id TEXT,
            subject TEXT NOT NULL,
            status TEXT NOT NULL,
            priority INTEGER NOT NULL,
            escalation_reason TEXT,
            assigned_to TEXT,
            resolution_time_hours REAL,
            closure_reason TEXT,
            csat INTEGER,
            predicted_csat REAL,
            created_at TEXT NOT NULL,
            closed_at TEXT
        );

        CREATE TABLE IF NOT EXISTS carts (
            id TEXT PRIMARY KEY,
            customer_id TEXT NOT NULL,
            items TEXT NOT NULL,
            total REAL NOT NULL,
            status TEXT NOT NULL,
            last_activity_at TEXT NOT NULL,
            recovery_attempt_count INTEGER NOT NULL DEFAULT 0,
            discount_codes_used TEXT NOT NULL DEFAULT '[]',
            final_attempt INTEGER NOT NULL DEFAULT 0,
            recovered_at TEXT,
            recovery_channel TEXT,
            created_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS purchases (
            id TEXT PRIMARY KEY,
            customer_id TEXT NOT NULL,
            amount REAL NOT NULL,
            description TEXT,
            purchased_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS invoices (
            id TEXT PRIMARY KEY,
            customer_id TEXT NOT NULL,
            number TEXT NOT NULL UNIQUE,
            amount REAL NOT NULL,
            status TEXT NOT NULL,
            due_date TEXT NOT NULL,
            late_fee REAL NOT NULL DEFAULT 0,
            reminder_count INTEGER NOT NULL DEFAULT 0,
            last_reminder_at TEXT,
            paid_at TEXT,
            created_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS generated_content (
            id TEXT PRIMARY KEY,
            content_type TEXT NOT NULL,
            platform TEXT NOT NULL,
            topic TEXT NOT NULL,
            asset_url TEXT,
            copy TEXT NOT NULL,
            hashtags TEXT NOT NULL,
            status TEXT NOT NULL,
            scheduled_for TEXT,
            published_at TEXT,
            external_id TEXT,
            metrics TEXT NOT NULL DEFAULT '{}',
            created_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS scheduled_messages (
            id TEXT PRIMARY KEY,
            lead_id TEXT,
            customer_id TEXT,
            channel TEXT NOT NULL,
            recipient TEXT NOT NULL,
            body TEXT NOT NULL,
            campaign TEXT,
            send_at TEXT NOT NULL,
            status TEXT NOT NULL,
            error TEXT,
            created_at TEXT NOT NULL,
            sent_at TEXT
        );

        CREATE TABLE IF NOT EXISTS alerts (
            id TEXT PRIMARY KEY,
            alert_type TEXT NOT NULL,
            severity TEXT NOT NULL,
            message TEXT NOT NULL,
            subject_key TEXT,
            data TEXT NOT NULL,
            status TEXT NOT NULL,
            acknowledged_by TEXT,
            acknowledged_at TEXT,
            resolved_at TEXT,
            created_at TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_leads_status_activity ON leads(status, last_activity_at);
        CREATE INDEX IF NOT EXISTS idx_leads_sender ON leads(sender_id);
        CREATE INDEX IF NOT EXISTS idx_leads_created ON leads(created_at DESC);
        CREATE INDEX IF NOT EXISTS idx_classifications_lead ON lead_classifications(lead_id, created_at DESC);
        CREATE INDEX IF NOT EXISTS idx_intents_lead ON lead_intents(lead_id);
        CREATE INDEX IF NOT EXISTS idx_customers_email ON customers(email);
        CREATE INDEX IF NOT EXISTS idx_customers_phone ON customers(phone);
        CREATE INDEX IF NOT EXISTS idx_conversations_lead ON conversations(lead_id, channel, status);
        CREATE INDEX IF NOT EXISTS idx_conversations_last ON conversations(last_message_at DESC);
        CREATE INDEX IF NOT EXISTS idx_messages_conversation ON messages(conversation_id, created_at);
        CREATE INDEX IF NOT EXISTS idx_raw_messages_processed ON raw_messages(processed, received_at);
        CREATE INDEX IF NOT EXISTS idx_cases_conversation ON cases(conversation_id);
        CREATE INDEX IF NOT EXISTS idx_carts_status_activity ON carts(status, last_activity_at);
        CREATE INDEX IF NOT EXISTS idx_purchases_at ON purchases(purchased_at);
        CREATE INDEX IF NOT EXISTS idx_invoices_status_due ON invoices(status, due_date);
        CREATE INDEX IF NOT EXISTS idx_content_status ON generated_content(status, scheduled_for);
        CREATE INDEX IF NOT EXISTS idx_scheduled_due ON scheduled_messages(status, send_at);
        CREATE INDEX IF NOT EXISTS idx_alerts_status ON alerts(status, alert_type, subject_key);
        "#,
    )?;
    Ok(())
}
