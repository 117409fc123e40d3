// Copyright (c) 2023 The MobileCoin Foundation

//! Trust evaluation of a certificate against a policy

use crate::{
    CancellationToken, Cancelled, Capability, Certificate, Persistence, Policy, PreferenceStore,
    RawOutcome, TrustAnchorService, TrustSetting,
};
use core::fmt::{Display, Formatter};
use core::time::Duration;
use serde::Deserialize;
use std::time::{SystemTime, SystemTimeError, UNIX_EPOCH};
use tracing::{debug, info, warn};

/// The outcome of a trust evaluation.
///
/// Every verdict is a normal result that callers are expected to branch on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Verdict {
    /// The certificate is trusted
    Proceed,
    /// The certificate may be trusted after asking the user
    Confirm,
    /// The certificate must not be trusted
    Deny,
    /// The chain is valid and the user has expressed no preference
    Unspecified,
    /// The certificate is not trusted, but the user could choose to trust it,
    /// for example an expired certificate or an unknown root
    RecoverableFailure,
    /// The certificate is not trusted and that cannot be overridden, for
    /// example a bad signature
    FatalFailure,
    /// Trust could not be determined
    OtherError,
}

impl From<RawOutcome> for Verdict {
    fn from(outcome: RawOutcome) -> Self {
        match outcome {
            RawOutcome::PROCEED => Verdict::Proceed,
            RawOutcome::CONFIRM => Verdict::Confirm,
            RawOutcome::DENY => Verdict::Deny,
            RawOutcome::UNSPECIFIED => Verdict::Unspecified,
            RawOutcome::RECOVERABLE_TRUST_FAILURE => Verdict::RecoverableFailure,
            RawOutcome::FATAL_TRUST_FAILURE => Verdict::FatalFailure,
            _ => Verdict::OtherError,
        }
    }
}

impl Display for Verdict {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        let name = match self {
            Verdict::Proceed => "proceed",
            Verdict::Confirm => "confirm",
            Verdict::Deny => "deny",
            Verdict::Unspecified => "unspecified",
            Verdict::RecoverableFailure => "recoverable trust failure",
            Verdict::FatalFailure => "fatal trust failure",
            Verdict::OtherError => "other error",
        };
        f.write_str(name)
    }
}

/// The time at which a chain must be valid
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum ValidationTime {
    /// The current system time
    #[default]
    Now,
    /// A fixed time since the unix epoch
    At(Duration),
    /// Do not check validity periods
    Ignore,
}

impl ValidationTime {
    /// The time to check validity periods at, given the clock reads `now`.
    /// `None` when validity periods are not checked.
    fn resolve(self, now: SystemTime) -> Result<Option<Duration>, SystemTimeError> {
        match self {
            ValidationTime::Now => now.duration_since(UNIX_EPOCH).map(Some),
            ValidationTime::At(time) => Ok(Some(time)),
            ValidationTime::Ignore => Ok(None),
        }
    }
}

/// Per evaluation settings
#[derive(Debug, Default, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct EvaluationOptions {
    /// The host being connected to, matched by the SSL policy
    pub hostname: Option<String>,
    /// When the chain must be valid
    pub time: ValidationTime,
}

impl EvaluationOptions {
    /// Set the hostname the SSL policy matches against
    pub fn with_hostname(mut self, hostname: impl Into<String>) -> Self {
        self.hostname = Some(hostname.into());
        self
    }

    /// Set when the chain must be valid
    pub fn with_time(mut self, time: ValidationTime) -> Self {
        self.time = time;
        self
    }
}

/// The result of one trust evaluation.
///
/// Results are never cached, anchors and user settings can change between
/// evaluations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrustResult {
    verdict: Verdict,
    explanation: String,
    evaluated_chain: Vec<Certificate>,
}

impl TrustResult {
    fn new(
        policy: &Policy,
        verdict: Verdict,
        detail: Option<String>,
        evaluated_chain: Vec<Certificate>,
    ) -> Self {
        let explanation = match detail {
            Some(detail) => format!("{} policy: {verdict} ({detail})", policy.name()),
            None => format!("{} policy: {verdict}", policy.name()),
        };
        Self {
            verdict,
            explanation,
            evaluated_chain,
        }
    }

    /// The verdict
    pub fn verdict(&self) -> Verdict {
        self.verdict
    }

    /// A deterministic human readable description of the policy and verdict
    pub fn explanation(&self) -> &str {
        &self.explanation
    }

    /// The certificates used to reach the verdict, starting with the leaf
    pub fn evaluated_chain(&self) -> &[Certificate] {
        &self.evaluated_chain
    }

    fn chain_names(&self) -> impl Iterator<Item = String> + '_ {
        self.evaluated_chain
            .iter()
            .map(|certificate| match certificate.common_name() {
                Ok(Some(common_name)) => common_name.to_string(),
                _ => certificate.identity().to_string(),
            })
    }
}

/// The alternate form, `{:#}`, puts each certificate of the evaluated chain on
/// its own line.
impl Display for TrustResult {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        if f.alternate() {
            write!(f, "- {}", self.explanation)?;
            for name in self.chain_names() {
                write!(f, "\n  - {name}")?;
            }
            return Ok(());
        }

        write!(f, "{}", self.explanation)?;
        if !self.evaluated_chain.is_empty() {
            let names = self.chain_names().collect::<Vec<_>>();
            write!(f, ", chain: {}", names.join(" -> "))?;
        }
        Ok(())
    }
}

/// Evaluates certificates against policies.
///
/// A user's explicit trust override for the certificate and policy wins over
/// the trust anchors. Otherwise the trust anchor service decides.
#[derive(Debug)]
pub struct TrustEvaluator<'a, A, P> {
    anchors: A,
    preferences: &'a PreferenceStore<P>,
}

impl<'a, A: TrustAnchorService, P: Persistence> TrustEvaluator<'a, A, P> {
    /// Create a new instance
    ///
    /// # Arguments
    /// * `anchors` - The trust anchor service that validates chains
    /// * `preferences` - Where user trust overrides are read from
    pub fn new(anchors: A, preferences: &'a PreferenceStore<P>) -> Self {
        Self {
            anchors,
            preferences,
        }
    }

    /// The trust anchor service
    pub fn anchors(&self) -> &A {
        &self.anchors
    }

    /// Evaluate `certificate` under `policy` at the current time.
    ///
    /// `chain` holds the intermediates to build the path from. It may start
    /// with `certificate` itself.
    pub fn evaluate(
        &self,
        certificate: &Certificate,
        policy: &Policy,
        chain: Option<&[Certificate]>,
    ) -> TrustResult {
        self.evaluate_with_options(certificate, policy, chain, &EvaluationOptions::default())
    }

    /// Evaluate with explicit [`EvaluationOptions`].
    pub fn evaluate_with_options(
        &self,
        certificate: &Certificate,
        policy: &Policy,
        chain: Option<&[Certificate]>,
        options: &EvaluationOptions,
    ) -> TrustResult {
        self.evaluate_at(
            certificate,
            policy,
            chain,
            options,
            &CancellationToken::new(),
            SystemTime::now(),
        )
    }

    /// Evaluate, giving up with [`Cancelled`] once `cancellation` is
    /// cancelled.
    ///
    /// A cancelled evaluation produces no verdict at all. Nothing is retried,
    /// a failed evaluation is reported as [`Verdict::OtherError`].
    pub fn evaluate_cancellable(
        &self,
        certificate: &Certificate,
        policy: &Policy,
        chain: Option<&[Certificate]>,
        options: &EvaluationOptions,
        cancellation: &CancellationToken,
    ) -> Result<TrustResult, Cancelled> {
        cancellation.check()?;
        let result =
            self.evaluate_at(certificate, policy, chain, options, cancellation, SystemTime::now());
        cancellation.check().map_err(|cancelled| {
            debug!(identity = %certificate.identity(), "evaluation cancelled");
            cancelled
        })?;
        Ok(result)
    }

    /// Evaluate with the clock reading `now`.
    fn evaluate_at(
        &self,
        certificate: &Certificate,
        policy: &Policy,
        chain: Option<&[Certificate]>,
        options: &EvaluationOptions,
        cancellation: &CancellationToken,
        now: SystemTime,
    ) -> TrustResult {
        let identity = certificate.identity();
        debug!(%identity, policy = %policy.name(), "evaluating trust");

        if self.preferences.supports(Capability::TrustSettings) {
            match self.preferences.user_trust_override(identity, policy) {
                Ok(Some(record)) => {
                    if let Some(verdict) = override_verdict(record.setting()) {
                        info!(%identity, policy = %policy.name(), %verdict, "user trust override");
                        return TrustResult::new(
                            policy,
                            verdict,
                            Some("user specified".into()),
                            vec![certificate.clone()],
                        );
                    }
                }
                Ok(None) => {}
                Err(error) => {
                    warn!(%identity, %error, "failed to read user trust override");
                    return TrustResult::new(
                        policy,
                        Verdict::OtherError,
                        Some(format!("user trust settings unavailable: {error}")),
                        vec![certificate.clone()],
                    );
                }
            }
        }

        let intermediates = match chain {
            Some([first, rest @ ..]) if first == certificate => rest,
            Some(chain) => chain,
            None => &[],
        };
        let time = match options.time.resolve(now) {
            Ok(time) => time,
            Err(error) => {
                warn!(%identity, %error, "system clock is before the unix epoch");
                return TrustResult::new(
                    policy,
                    Verdict::OtherError,
                    Some("system clock is before the unix epoch".into()),
                    vec![certificate.clone()],
                );
            }
        };
        let constraints = policy.constraints(options.hostname.as_deref(), time);

        let result = match self.anchors.build_and_validate_chain(
            certificate,
            intermediates,
            &constraints,
            cancellation,
        ) {
            Ok(outcome) => {
                let verdict = Verdict::from(outcome.outcome);
                let detail = if verdict == Verdict::OtherError {
                    Some(format!("unexpected trust outcome {}", outcome.outcome.0))
                } else if outcome.reasons.is_empty() {
                    None
                } else {
                    Some(outcome.reasons.join("; "))
                };
                let mut evaluated_chain = outcome.chain;
                if evaluated_chain.is_empty() {
                    evaluated_chain.push(certificate.clone());
                }
                TrustResult::new(policy, verdict, detail, evaluated_chain)
            }
            Err(error) => {
                warn!(%identity, %error, "trust anchor service failed");
                TrustResult::new(
                    policy,
                    Verdict::OtherError,
                    Some(error.to_string()),
                    vec![certificate.clone()],
                )
            }
        };

        debug!(%identity, verdict = %result.verdict(), "evaluated trust");
        result
    }
}

fn override_verdict(setting: TrustSetting) -> Option<Verdict> {
    match setting {
        TrustSetting::Unspecified => None,
        TrustSetting::Proceed => Some(Verdict::Proceed),
        TrustSetting::Confirm => Some(Verdict::Confirm),
        TrustSetting::Deny => Some(Verdict::Deny),
    }
}
