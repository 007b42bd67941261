//! The cancel-and-recreate invoice orchestrator.
//!
//! Issuing a replacement invoice is not atomic at the provider: the protocol
//! here guarantees the billing party always has a live invoice by publishing
//! the replacement before the superseded invoice is canceled, and serializes
//! concurrent recreations of the same invoice behind a per-invoice lock.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{Days, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use chessbill_core::{DomainError, Money, RecordId};
use chessbill_fees::{FeeSchedule, PricedLineItem, price};
use chessbill_roster::{RecoveryOutcome, RecoveryReport, RosterEntry, recover};

use crate::error::BillingError;
use crate::provider::{
    AcceptedPaymentMethods, CustomerId, CustomerProfile, DeliveryMethod, IdempotencyKey, Invoice,
    InvoiceId, InvoicingProvider, NewInvoice, OrderLineItem, ProviderError,
};

/// What to do when sanitization leaves unrecoverable entries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnrecoverablePolicy {
    /// Fail the whole recreation before any provider call. The default:
    /// never bill a roster containing placeholder names.
    #[default]
    FailClosed,
    /// Exclude unrecoverable entries from billing and proceed, recording
    /// each exclusion in the recovery report.
    ExcludeAndProceed,
}

/// Orchestrator configuration. Injected at construction; nothing here is
/// read from globals.
#[derive(Debug, Clone)]
pub struct BillingConfig {
    /// Provider location the orders are created under.
    pub location_id: String,
    /// Days between issuance and the invoice due date.
    pub due_in_days: u64,
    /// Bounded wait for the provider to expose the public invoice URL.
    pub url_poll_attempts: u32,
    pub url_poll_interval: Duration,
    pub unrecoverable_policy: UnrecoverablePolicy,
    pub schedule: FeeSchedule,
}

impl BillingConfig {
    pub fn new(location_id: impl Into<String>) -> Self {
        Self {
            location_id: location_id.into(),
            due_in_days: 7,
            url_poll_attempts: 5,
            url_poll_interval: Duration::from_millis(400),
            unrecoverable_policy: UnrecoverablePolicy::default(),
            schedule: FeeSchedule::default(),
        }
    }
}

/// The person the invoice is addressed to (sponsor, coach, or club contact).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BillingContact {
    /// Full display name. Split at the first whitespace for the provider's
    /// given/family fields.
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub club: Option<String>,
    pub district: Option<String>,
    pub address: Option<String>,
}

impl BillingContact {
    fn split_name(&self) -> (String, String) {
        match self.name.trim().split_once(char::is_whitespace) {
            Some((given, family)) => (given.to_string(), family.trim().to_string()),
            None => (self.name.trim().to_string(), String::new()),
        }
    }

    /// Company line composed from the club and district fields.
    fn organization(&self) -> Option<String> {
        let parts: Vec<&str> = [self.club.as_deref(), self.district.as_deref()]
            .into_iter()
            .flatten()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect();
        if parts.is_empty() {
            None
        } else {
            Some(parts.join(" / "))
        }
    }
}

/// One invoice recreation request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvoiceRequest {
    /// Stable identity of the logical invoice record, unchanged across
    /// recreations.
    pub record_id: RecordId,
    pub event_name: String,
    pub event_date: Option<NaiveDate>,
    pub team_code: String,
    pub contact: BillingContact,
    /// Bookkeeper/coordinator emails copied on the invoice. Blanks dropped.
    pub cc_recipients: Vec<String>,
    pub roster: Vec<RosterEntry>,
    /// Per-event fee schedule; falls back to the configured default when
    /// absent.
    pub schedule: Option<FeeSchedule>,
    /// Custom user-facing invoice number. When absent and a replaced invoice
    /// exists, its number is reused.
    pub invoice_number: Option<String>,
    /// Operator-supplied explanation appended to the invoice description
    /// when this recreation replaces an earlier invoice.
    pub revision_note: Option<String>,
}

/// Outcome of a successful recreation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvoiceResult {
    /// The published replacement invoice as last fetched from the provider.
    pub invoice: Invoice,
    pub public_url: String,
    pub line_items: Vec<PricedLineItem>,
    /// Aggregate charge for substituted players, billed as its own order
    /// line. Zero when the roster has no substitutions.
    pub substitution_total: Money,
    /// Sum of the priced line items plus the substitution charge. The
    /// provider's own total is on `invoice.total_minor`.
    pub total: Money,
    pub report: RecoveryReport,
    /// Non-fatal problems, e.g. a replaced invoice that could not be
    /// canceled. The new invoice is live regardless.
    pub warnings: Vec<String>,
    pub replaced: Option<InvoiceId>,
}

/// Recreates invoices against an [`InvoicingProvider`].
pub struct InvoiceOrchestrator<P> {
    provider: Arc<P>,
    config: BillingConfig,
    /// Per-source-invoice locks. Concurrent recreations of the same invoice
    /// would each cancel it and orphan one replacement; holding the lock for
    /// the whole protocol closes that race.
    locks: Mutex<HashMap<InvoiceId, Arc<Mutex<()>>>>,
}

impl<P: InvoicingProvider> InvoiceOrchestrator<P> {
    pub fn new(provider: Arc<P>, config: BillingConfig) -> Self {
        Self {
            provider,
            config,
            locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &BillingConfig {
        &self.config
    }

    async fn invoice_lock(&self, id: &InvoiceId) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        Arc::clone(locks.entry(id.clone()).or_default())
    }

    /// Drop a lock entry once no task holds or awaits it, so the map does
    /// not grow with every invoice ever recreated.
    async fn evict_lock(&self, id: &InvoiceId) {
        let mut locks = self.locks.lock().await;
        if locks.get(id).is_some_and(|lock| Arc::strong_count(lock) == 1) {
            locks.remove(id);
        }
    }

    #[cfg(test)]
    async fn lock_entries(&self) -> usize {
        self.locks.lock().await.len()
    }

    /// Cancel-and-recreate an invoice from a roster.
    ///
    /// When `existing` names an invoice, it is canceled only after the
    /// replacement is live. Fails without touching the provider when the
    /// roster contains unrecoverable entries under the fail-closed policy.
    pub async fn recreate(
        &self,
        request: InvoiceRequest,
        existing: Option<InvoiceId>,
    ) -> Result<InvoiceResult, BillingError> {
        let guard = match &existing {
            Some(id) => Some(self.invoice_lock(id).await.lock_owned().await),
            None => None,
        };
        let result = self.recreate_locked(request, &existing).await;
        drop(guard);
        if let Some(id) = &existing {
            self.evict_lock(id).await;
        }
        result
    }

    async fn recreate_locked(
        &self,
        request: InvoiceRequest,
        existing: &Option<InvoiceId>,
    ) -> Result<InvoiceResult, BillingError> {
        // Sanitize first; the policy check must run before any provider call.
        let (cleaned, mut report) = recover(&request.roster);
        let billable = self.apply_policy(cleaned, &mut report)?;
        if billable.is_empty() {
            return Err(BillingError::Validation(
                "no billable roster entries remain after recovery".to_string(),
            ));
        }
        info!(
            record_id = %request.record_id,
            total = report.summary.total,
            recovered = report.summary.recovered,
            excluded = report.excluded,
            "roster sanitized"
        );

        let schedule = request
            .schedule
            .clone()
            .unwrap_or_else(|| self.config.schedule.clone());
        let line_items = price_roster(&billable, &schedule)?;
        let substitution_total = substitution_total(&billable, &schedule)?;
        let mut total = substitution_total;
        for item in &line_items {
            total = total
                .checked_add(item.total)
                .ok_or_else(|| DomainError::invariant("invoice total overflow"))?;
        }

        let customer_id = self.resolve_customer(&request).await?;

        let mut warnings = Vec::new();
        let replaced = match &existing {
            Some(old_id) => match self.provider.get_invoice(old_id).await {
                Ok(invoice) => Some(invoice),
                Err(err) => {
                    warn!(invoice = %old_id, error = %err, "replaced invoice could not be loaded");
                    warnings.push(format!(
                        "replaced invoice {old_id} could not be loaded and will not be canceled: {err}"
                    ));
                    None
                }
            },
            None => None,
        };

        let order = self
            .provider
            .create_order(
                IdempotencyKey::new(),
                &self.config.location_id,
                &customer_id,
                self.order_lines(&line_items, substitution_total)?,
            )
            .await?;
        debug!(order = %order.id, total_minor = order.total_minor, "order created");

        let draft = self
            .provider
            .create_invoice(
                IdempotencyKey::new(),
                self.build_invoice(&request, &customer_id, order.id, replaced.as_ref()),
            )
            .await?;

        // Version tokens go stale; fetch right before each versioned mutation.
        let current = self.provider.get_invoice(&draft.id).await?;
        let published = self
            .provider
            .publish_invoice(IdempotencyKey::new(), &draft.id, current.version)
            .await?;
        info!(invoice = %published.id, number = ?published.invoice_number, "replacement invoice published");

        if let Some(old) = &replaced {
            if let Err(err) = self.cancel_replaced(old).await {
                warn!(invoice = %old.id, error = %err, "replaced invoice could not be canceled");
                warnings.push(format!(
                    "invoice {} is live but the replaced invoice {} could not be canceled: {err}",
                    published.id, old.id
                ));
            }
        }

        let invoice = self.await_public_url(&published.id).await?;
        let public_url = invoice
            .public_url
            .clone()
            .ok_or_else(|| BillingError::Timeout(format!("invoice {} has no public URL", invoice.id)))?;

        Ok(InvoiceResult {
            invoice,
            public_url,
            line_items,
            substitution_total,
            total,
            report,
            warnings,
            replaced: existing.clone(),
        })
    }

    /// Apply the unrecoverable-entry policy, returning the billable subset.
    fn apply_policy(
        &self,
        cleaned: Vec<RosterEntry>,
        report: &mut RecoveryReport,
    ) -> Result<Vec<RosterEntry>, BillingError> {
        if !report.has_unrecoverable() {
            return Ok(cleaned);
        }
        match self.config.unrecoverable_policy {
            UnrecoverablePolicy::FailClosed => Err(BillingError::UnrecoverableEntries {
                count: report.unrecoverable_count(),
            }),
            UnrecoverablePolicy::ExcludeAndProceed => {
                let excluded: Vec<usize> = report
                    .entries
                    .iter()
                    .filter(|e| e.outcome == RecoveryOutcome::Unrecoverable)
                    .map(|e| e.original_index)
                    .collect();
                for &index in &excluded {
                    report.record_exclusion(index, "display name unrecoverable");
                }
                Ok(cleaned
                    .into_iter()
                    .enumerate()
                    .filter(|(i, _)| !excluded.contains(i))
                    .map(|(_, entry)| entry)
                    .collect())
            }
        }
    }

    /// Resolve the billing contact to a provider customer by exact email
    /// match, refreshing its details on match and creating it otherwise.
    async fn resolve_customer(&self, request: &InvoiceRequest) -> Result<CustomerId, BillingError> {
        let contact = &request.contact;
        let (given_name, family_name) = contact.split_name();
        let profile = CustomerProfile {
            given_name,
            family_name,
            email: contact.email.clone(),
            company_name: contact.organization(),
            phone: contact.phone.clone(),
            address: contact.address.clone(),
            note: Some(format!("Team {}", request.team_code)),
        };
        match self.provider.find_customer_by_email(&contact.email).await? {
            Some(existing) => {
                self.provider.update_customer(&existing.id, profile).await?;
                Ok(existing.id)
            }
            None => {
                let created = self
                    .provider
                    .create_customer(IdempotencyKey::new(), profile)
                    .await?;
                Ok(created.id)
            }
        }
    }

    /// One order line per priced player, with the fee breakdown in the note,
    /// plus one aggregate substitution-fee line when the roster owes one.
    fn order_lines(
        &self,
        line_items: &[PricedLineItem],
        substitution_total: Money,
    ) -> Result<Vec<OrderLineItem>, BillingError> {
        let mut lines = line_items
            .iter()
            .map(|item| {
                let name = item
                    .entry
                    .display_name()
                    .ok_or_else(|| DomainError::invariant("priced entry lost its display name"))?;
                Ok(OrderLineItem {
                    name: format!("Registration: {name}"),
                    quantity: 1,
                    unit_price_minor: item.total.to_minor_units()?,
                    note: Some(line_note(item)),
                })
            })
            .collect::<Result<Vec<_>, BillingError>>()?;
        if !substitution_total.is_zero() {
            lines.push(OrderLineItem {
                name: "Substitution Fee".to_string(),
                quantity: 1,
                unit_price_minor: substitution_total.to_minor_units()?,
                note: Some("Fee for substituting a player after registration.".to_string()),
            });
        }
        Ok(lines)
    }

    fn build_invoice(
        &self,
        request: &InvoiceRequest,
        customer_id: &CustomerId,
        order_id: crate::provider::OrderId,
        replaced: Option<&Invoice>,
    ) -> NewInvoice {
        let today = Utc::now().date_naive();
        let title_date = request.event_date.unwrap_or(today);
        let invoice_number = request
            .invoice_number
            .clone()
            .or_else(|| replaced.and_then(|i| i.invoice_number.clone()));

        let mut description = Vec::new();
        if let Some(note) = request
            .revision_note
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
        {
            description.push(note.to_string());
        }
        if let Some(number) = replaced.and_then(|i| i.invoice_number.as_deref()) {
            description.push(format!("This invoice replaces #{number}."));
        }
        description.push("Thank you for your registration.".to_string());

        NewInvoice {
            order_id,
            primary_recipient: customer_id.clone(),
            cc_recipients: request
                .cc_recipients
                .iter()
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
            due_date: today
                .checked_add_days(Days::new(self.config.due_in_days))
                .unwrap_or(today),
            delivery_method: DeliveryMethod::Email,
            accepted_payment_methods: AcceptedPaymentMethods::default(),
            invoice_number,
            title: format!(
                "{} @ {} {}",
                request.team_code,
                title_date.format("%m/%d/%Y"),
                request.event_name
            ),
            description: description.join("\n\n"),
        }
    }

    async fn cancel_replaced(&self, old: &Invoice) -> Result<(), ProviderError> {
        let current = self.provider.get_invoice(&old.id).await?;
        self.provider.cancel_invoice(&old.id, current.version).await
    }

    /// Bounded poll for the provider to expose the public invoice URL.
    async fn await_public_url(&self, id: &InvoiceId) -> Result<Invoice, BillingError> {
        for attempt in 1..=self.config.url_poll_attempts {
            let invoice = self.provider.get_invoice(id).await?;
            if invoice.public_url.is_some() {
                return Ok(invoice);
            }
            if attempt < self.config.url_poll_attempts {
                tokio::time::sleep(self.config.url_poll_interval).await;
            }
        }
        Err(BillingError::Timeout(format!(
            "invoice {id} was published but exposed no public URL after {} polls",
            self.config.url_poll_attempts
        )))
    }
}

/// Price every billable entry, folding in the bulk membership discount when
/// the roster's action count reaches the schedule's threshold.
fn price_roster(
    billable: &[RosterEntry],
    schedule: &FeeSchedule,
) -> Result<Vec<PricedLineItem>, BillingError> {
    let action_count = billable
        .iter()
        .filter(|e| e.requests_membership_action())
        .count();
    let effective = if action_count >= schedule.bulk_threshold {
        debug!(action_count, "bulk membership discount applied");
        schedule.with_bulk_discount()
    } else {
        schedule.clone()
    };
    billable
        .iter()
        .map(|entry| price(entry, &effective).map_err(BillingError::from))
        .collect()
}

/// Flat substitution fee owed once per substituted player on the roster.
fn substitution_total(
    billable: &[RosterEntry],
    schedule: &FeeSchedule,
) -> Result<Money, BillingError> {
    let mut total = Money::ZERO;
    for _ in billable.iter().filter(|e| e.is_substituted()) {
        total = total
            .checked_add(schedule.substitution_fee)
            .ok_or_else(|| DomainError::invariant("substitution fee overflow"))?;
    }
    Ok(total)
}

/// Audit note for one order line: membership id, fee components, flags.
fn line_note(item: &PricedLineItem) -> String {
    let mut parts = vec![
        format!("USCF {}", item.entry.membership_id_or_new()),
        format!("base {}", item.base_fee.amount()),
    ];
    if !item.late_fee.is_zero() {
        parts.push(format!("late {}", item.late_fee.amount()));
    }
    if !item.action_fee.is_zero() {
        parts.push(format!("membership {}", item.action_fee.amount()));
    }
    if item.entry.is_special_program() {
        parts.push("GT".to_string());
    }
    if item.entry.is_substituted() {
        parts.push("substituted".to_string());
    }
    if let Some(section) = item.entry.section.as_deref() {
        parts.push(format!("section {section}"));
    }
    parts.join("; ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{FailPoint, InMemoryProvider, ProviderCall};

    fn entry(name: &str, base: i64) -> RosterEntry {
        RosterEntry {
            player_name: Some(name.to_string()),
            base_registration_fee: Some(Money::from_major(base)),
            waive_late_fee: Some(true),
            ..RosterEntry::default()
        }
    }

    fn corrupt_entry() -> RosterEntry {
        RosterEntry {
            player_name: Some("undefined undefined".to_string()),
            base_registration_fee: Some(Money::from_major(20)),
            ..RosterEntry::default()
        }
    }

    fn request(roster: Vec<RosterEntry>) -> InvoiceRequest {
        InvoiceRequest {
            record_id: RecordId::new(),
            event_name: "Spring Open".to_string(),
            event_date: chrono::NaiveDate::from_ymd_opt(2026, 10, 3),
            team_code: "AUS-01".to_string(),
            contact: BillingContact {
                name: "Maria Santos".to_string(),
                email: "maria@example.test".to_string(),
                phone: Some("555-0100".to_string()),
                club: Some("Austin Scholastic".to_string()),
                district: None,
                address: None,
            },
            cc_recipients: vec!["books@example.test".to_string(), "  ".to_string()],
            roster,
            schedule: None,
            invoice_number: None,
            revision_note: None,
        }
    }

    fn config() -> BillingConfig {
        let mut config = BillingConfig::new("LOC-1");
        config.url_poll_interval = Duration::from_millis(1);
        config
    }

    fn orchestrator(provider: Arc<InMemoryProvider>) -> InvoiceOrchestrator<InMemoryProvider> {
        InvoiceOrchestrator::new(provider, config())
    }

    #[tokio::test]
    async fn recreates_invoice_and_cancels_old_only_after_publish() {
        let provider = Arc::new(InMemoryProvider::new());
        let old_id = provider.seed_published_invoice(Some("R-1042"), 2500);
        let orchestrator = orchestrator(Arc::clone(&provider));

        let result = orchestrator
            .recreate(
                request(vec![entry("Ana Lopez", 25), entry("Ben Tran", 30)]),
                Some(old_id.clone()),
            )
            .await
            .unwrap();

        assert_eq!(result.total, Money::from_major(55));
        assert_eq!(result.invoice.total_minor, 5500);
        assert!(result.public_url.starts_with("https://"));
        assert!(result.warnings.is_empty());
        // Replacement reuses the superseded invoice's number.
        assert_eq!(result.invoice.invoice_number.as_deref(), Some("R-1042"));
        assert!(
            provider
                .invoice(&old_id)
                .is_some_and(|i| i.status == crate::provider::InvoiceStatus::Canceled)
        );

        let calls = provider.calls();
        let publish_at = calls
            .iter()
            .position(|c| matches!(c, ProviderCall::PublishInvoice { id } if *id == result.invoice.id))
            .unwrap();
        let cancel_at = calls
            .iter()
            .position(|c| matches!(c, ProviderCall::CancelInvoice { id } if *id == old_id))
            .unwrap();
        assert!(publish_at < cancel_at, "old invoice canceled before replacement was live");
    }

    #[tokio::test]
    async fn strict_policy_fails_before_any_provider_call() {
        let provider = Arc::new(InMemoryProvider::new());
        let orchestrator = orchestrator(Arc::clone(&provider));

        let err = orchestrator
            .recreate(request(vec![entry("Ana Lopez", 25), corrupt_entry()]), None)
            .await
            .unwrap_err();

        assert_eq!(err, BillingError::UnrecoverableEntries { count: 1 });
        assert!(err.to_string().contains('1'));
        assert!(provider.calls().is_empty(), "provider was touched before the policy check");
    }

    #[tokio::test]
    async fn exclude_and_proceed_bills_the_recoverable_subset() {
        let provider = Arc::new(InMemoryProvider::new());
        let mut config = config();
        config.unrecoverable_policy = UnrecoverablePolicy::ExcludeAndProceed;
        let orchestrator = InvoiceOrchestrator::new(Arc::clone(&provider), config);

        let result = orchestrator
            .recreate(request(vec![entry("Ana Lopez", 25), corrupt_entry()]), None)
            .await
            .unwrap();

        assert_eq!(result.line_items.len(), 1);
        assert_eq!(result.report.excluded, 1);
        assert_eq!(result.total, Money::from_major(25));
    }

    #[tokio::test]
    async fn cancellation_failure_is_a_warning_not_a_rollback() {
        let provider = Arc::new(InMemoryProvider::new());
        let old_id = provider.seed_published_invoice(None, 2500);
        provider.fail_at(
            FailPoint::CancelInvoice,
            ProviderError::api("INTERNAL_SERVER_ERROR", "UNAVAILABLE", "try later"),
        );
        let orchestrator = orchestrator(Arc::clone(&provider));

        let result = orchestrator
            .recreate(request(vec![entry("Ana Lopez", 25)]), Some(old_id.clone()))
            .await
            .unwrap();

        assert_eq!(result.warnings.len(), 1);
        assert!(result.warnings[0].contains(old_id.as_str()));
        assert!(result.public_url.starts_with("https://"));
    }

    #[tokio::test]
    async fn missing_existing_invoice_is_a_warning() {
        let provider = Arc::new(InMemoryProvider::new());
        let orchestrator = orchestrator(Arc::clone(&provider));

        let result = orchestrator
            .recreate(
                request(vec![entry("Ana Lopez", 25)]),
                Some(InvoiceId::new("INV-GONE")),
            )
            .await
            .unwrap();

        assert_eq!(result.warnings.len(), 1);
        assert!(result.warnings[0].contains("INV-GONE"));
        // Nothing to cancel, so no cancel call appears in the trace.
        assert!(
            !provider
                .calls()
                .iter()
                .any(|c| matches!(c, ProviderCall::CancelInvoice { .. }))
        );
    }

    #[tokio::test]
    async fn url_poll_gives_up_with_a_timeout() {
        let provider = Arc::new(InMemoryProvider::with_url_delay(100));
        let orchestrator = orchestrator(Arc::clone(&provider));

        let err = orchestrator
            .recreate(request(vec![entry("Ana Lopez", 25)]), None)
            .await
            .unwrap_err();

        assert!(matches!(err, BillingError::Timeout(_)));
    }

    #[tokio::test]
    async fn url_propagation_delay_is_tolerated_within_the_window() {
        let provider = Arc::new(InMemoryProvider::with_url_delay(3));
        let orchestrator = orchestrator(Arc::clone(&provider));

        let result = orchestrator
            .recreate(request(vec![entry("Ana Lopez", 25)]), None)
            .await
            .unwrap();
        assert!(result.public_url.starts_with("https://"));
    }

    #[tokio::test]
    async fn customer_is_created_once_and_refreshed_after() {
        let provider = Arc::new(InMemoryProvider::new());
        let orchestrator = orchestrator(Arc::clone(&provider));

        orchestrator
            .recreate(request(vec![entry("Ana Lopez", 25)]), None)
            .await
            .unwrap();
        orchestrator
            .recreate(request(vec![entry("Ana Lopez", 25)]), None)
            .await
            .unwrap();

        let creates = provider
            .calls()
            .iter()
            .filter(|c| matches!(c, ProviderCall::CreateCustomer { .. }))
            .count();
        let updates = provider
            .calls()
            .iter()
            .filter(|c| matches!(c, ProviderCall::UpdateCustomer { .. }))
            .count();
        assert_eq!((creates, updates), (1, 1));

        let profile = provider.customer_profile("maria@example.test").unwrap();
        assert_eq!(profile.given_name, "Maria");
        assert_eq!(profile.family_name, "Santos");
        assert_eq!(profile.company_name.as_deref(), Some("Austin Scholastic"));
        assert_eq!(profile.note.as_deref(), Some("Team AUS-01"));
    }

    #[tokio::test]
    async fn invoice_payload_carries_title_due_date_and_audit_notes() {
        let provider = Arc::new(InMemoryProvider::new());
        let orchestrator = orchestrator(Arc::clone(&provider));

        let mut req = request(vec![RosterEntry {
            membership_id: Some("12345678".to_string()),
            membership_action: Some(true),
            special_program: Some(true),
            ..entry("Ana Lopez", 25)
        }]);
        req.revision_note = Some("Section change for Ana Lopez.".to_string());

        let result = orchestrator.recreate(req, None).await.unwrap();
        let payload = provider.invoice_payload(&result.invoice.id).unwrap();

        assert_eq!(payload.title, "AUS-01 @ 10/03/2026 Spring Open");
        assert_eq!(payload.cc_recipients, vec!["books@example.test".to_string()]);
        assert!(payload.description.starts_with("Section change for Ana Lopez."));
        assert!(payload.description.ends_with("Thank you for your registration."));
        let today = Utc::now().date_naive();
        assert_eq!(payload.due_date, today.checked_add_days(Days::new(7)).unwrap());

        // Base 25 + membership 24, late waived.
        assert_eq!(result.total, Money::from_major(49));
        let note = provider
            .calls()
            .iter()
            .find_map(|c| match c {
                ProviderCall::CreateOrder { lines, .. } => Some(*lines),
                _ => None,
            })
            .unwrap();
        assert_eq!(note, 1);
    }

    #[tokio::test]
    async fn bulk_membership_discount_applies_at_the_threshold() {
        let provider = Arc::new(InMemoryProvider::new());
        let orchestrator = orchestrator(Arc::clone(&provider));

        let roster: Vec<RosterEntry> = (0..24)
            .map(|i| RosterEntry {
                membership_action: Some(true),
                ..entry(&format!("Player {i}"), 25)
            })
            .collect();
        let result = orchestrator.recreate(request(roster), None).await.unwrap();

        // 24 x (25 base + 20 discounted membership).
        assert_eq!(result.total, Money::from_major(24 * 45));
        assert!(
            result
                .line_items
                .iter()
                .all(|item| item.action_fee == Money::from_major(20))
        );
    }

    #[tokio::test]
    async fn concurrent_recreations_of_the_same_invoice_serialize() {
        let provider = Arc::new(InMemoryProvider::new());
        let old_id = provider.seed_published_invoice(None, 2500);
        let orchestrator = Arc::new(orchestrator(Arc::clone(&provider)));

        let a = tokio::spawn({
            let orchestrator = Arc::clone(&orchestrator);
            let old_id = old_id.clone();
            async move {
                orchestrator
                    .recreate(request(vec![entry("Ana Lopez", 25)]), Some(old_id))
                    .await
            }
        });
        let b = tokio::spawn({
            let orchestrator = Arc::clone(&orchestrator);
            let old_id = old_id.clone();
            async move {
                orchestrator
                    .recreate(request(vec![entry("Ben Tran", 30)]), Some(old_id))
                    .await
            }
        });
        let (a, b) = (a.await.unwrap(), b.await.unwrap());

        // Both runs complete; the one that went second finds the invoice
        // already canceled and records a warning instead of double-canceling.
        let results = [a.unwrap(), b.unwrap()];
        let warned: usize = results.iter().map(|r| r.warnings.len()).sum();
        assert_eq!(warned, 1);
        assert_eq!(orchestrator.lock_entries().await, 0);
    }

    #[tokio::test]
    async fn lock_entry_is_dropped_once_the_recreation_finishes() {
        let provider = Arc::new(InMemoryProvider::new());
        let old_id = provider.seed_published_invoice(Some("R-7"), 2500);
        let orchestrator = orchestrator(Arc::clone(&provider));

        orchestrator
            .recreate(request(vec![entry("Ana Lopez", 25)]), Some(old_id))
            .await
            .unwrap();

        assert_eq!(orchestrator.lock_entries().await, 0);
    }

    #[tokio::test]
    async fn substituted_player_gets_a_fee_line_instead_of_a_late_fee() {
        let provider = Arc::new(InMemoryProvider::new());
        let orchestrator = orchestrator(Arc::clone(&provider));

        let mut substitute = entry("Devi Rao", 30);
        substitute.waive_late_fee = Some(false);
        substitute.is_substitution = Some(true);

        let result = orchestrator
            .recreate(request(vec![entry("Ana Lopez", 25), substitute]), None)
            .await
            .unwrap();

        // 25 + 30 in registrations plus the flat 2.00 substitution charge;
        // the substitute owes no late fee despite registering with none of
        // the usual exemptions.
        assert_eq!(result.substitution_total, Money::from_major(2));
        assert_eq!(result.line_items[1].late_fee, Money::ZERO);
        assert_eq!(result.total, Money::from_major(57));
        assert_eq!(result.invoice.total_minor, 5700);

        let payload = provider.invoice_payload(&result.invoice.id).unwrap();
        let lines = provider.order_lines(&payload.order_id).unwrap();
        assert_eq!(lines.len(), 3);
        let fee_line = lines.iter().find(|l| l.name == "Substitution Fee").unwrap();
        assert_eq!(fee_line.quantity, 1);
        assert_eq!(fee_line.unit_price_minor, 200);
        assert_eq!(
            fee_line.note.as_deref(),
            Some("Fee for substituting a player after registration.")
        );
    }
}
