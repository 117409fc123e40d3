// Copyright (c) 2023 The MobileCoin Foundation

//! Evaluating real certificate chains against the built in policies.

mod common;

use common::*;
use mc_certificate_trust::{
    AnchorConfig, AnchorSet, CancellationToken, Cancelled, EvaluationOptions, MemoryPersistence,
    PolicyRegistry, PreferenceStore, TrustEvaluator, TrustSetting, ValidationTime, Verdict,
};
use std::time::Duration;

fn at_now() -> EvaluationOptions {
    EvaluationOptions::default().with_time(ValidationTime::At(NOW))
}

#[test]
fn sgx_chain_proceeds() {
    let preferences = PreferenceStore::new(MemoryPersistence::new());
    let evaluator = TrustEvaluator::new(anchors(), &preferences);
    let leaf = certificate(SGX_LEAF);
    let processor = certificate(SGX_PROCESSOR_CA);
    let root = certificate(SGX_ROOT_CA);

    let result = evaluator.evaluate_with_options(
        &leaf,
        PolicyRegistry::x509(),
        Some([leaf.clone(), processor.clone()].as_slice()),
        &at_now(),
    );

    assert_eq!(result.verdict(), Verdict::Proceed);
    assert_eq!(result.explanation(), "X.509 policy: proceed");
    assert_eq!(result.evaluated_chain(), &[leaf, processor, root]);
}

#[test]
fn server_certificate_for_its_hostname() {
    let preferences = PreferenceStore::new(MemoryPersistence::new());
    let evaluator = TrustEvaluator::new(anchors(), &preferences);
    let chain = [certificate(EXAMPLE_ISSUING_CA)];
    let server = certificate(EXAMPLE_SERVER);

    for hostname in ["www.example.com", "api.example.org"] {
        let options = at_now().with_hostname(hostname);
        let result = evaluator.evaluate_with_options(
            &server,
            PolicyRegistry::ssl(),
            Some(chain.as_slice()),
            &options,
        );
        assert_eq!(result.verdict(), Verdict::Proceed, "{hostname}");
        assert_eq!(result.evaluated_chain().len(), 3);
    }
}

#[test]
fn server_certificate_for_another_hostname() {
    let preferences = PreferenceStore::new(MemoryPersistence::new());
    let evaluator = TrustEvaluator::new(anchors(), &preferences);
    let chain = [certificate(EXAMPLE_ISSUING_CA)];
    let options = at_now().with_hostname("mail.example.net");

    let result = evaluator.evaluate_with_options(
        &certificate(EXAMPLE_SERVER),
        PolicyRegistry::ssl(),
        Some(chain.as_slice()),
        &options,
    );

    assert_eq!(result.verdict(), Verdict::RecoverableFailure);
    assert_eq!(
        result.explanation(),
        "SSL policy: recoverable trust failure (\"www.example.com\" does not match hostname mail.example.net)"
    );
}

#[test]
fn usage_decides_between_ssl_and_smime() {
    let preferences = PreferenceStore::new(MemoryPersistence::new());
    let evaluator = TrustEvaluator::new(anchors(), &preferences);
    let chain = [certificate(EXAMPLE_ISSUING_CA)];
    let mail = certificate(EXAMPLE_MAIL);
    let server = certificate(EXAMPLE_SERVER);

    let result = evaluator.evaluate_with_options(
        &mail,
        PolicyRegistry::smime(),
        Some(chain.as_slice()),
        &at_now(),
    );
    assert_eq!(result.verdict(), Verdict::Proceed);

    let result = evaluator.evaluate_with_options(
        &mail,
        PolicyRegistry::ssl(),
        Some(chain.as_slice()),
        &at_now(),
    );
    assert_eq!(result.verdict(), Verdict::RecoverableFailure);
    assert_eq!(
        result.explanation(),
        "SSL policy: recoverable trust failure (extended key usage of \"Alice Example\" does not permit SSL)"
    );

    let result = evaluator.evaluate_with_options(
        &server,
        PolicyRegistry::smime(),
        Some(chain.as_slice()),
        &at_now(),
    );
    assert_eq!(result.verdict(), Verdict::RecoverableFailure);
    assert_eq!(
        result.explanation(),
        "S/MIME policy: recoverable trust failure (extended key usage of \"www.example.com\" does not permit S/MIME)"
    );

    let result = evaluator.evaluate_with_options(
        &server,
        PolicyRegistry::x509(),
        Some(chain.as_slice()),
        &at_now(),
    );
    assert_eq!(result.verdict(), Verdict::Proceed);
}

#[test]
fn expired_server_certificate() {
    let preferences = PreferenceStore::new(MemoryPersistence::new());
    let evaluator = TrustEvaluator::new(anchors(), &preferences);
    let chain = [certificate(EXAMPLE_ISSUING_CA)];
    // 2036-01-01
    let later = Duration::from_secs(2_082_758_400);
    let options = EvaluationOptions::default().with_time(ValidationTime::At(later));

    let result = evaluator.evaluate_with_options(
        &certificate(EXAMPLE_SERVER),
        PolicyRegistry::x509(),
        Some(chain.as_slice()),
        &options,
    );
    assert_eq!(result.verdict(), Verdict::RecoverableFailure);
    assert_eq!(
        result.explanation(),
        "X.509 policy: recoverable trust failure (\"www.example.com\" has expired)"
    );

    let options = EvaluationOptions::default().with_time(ValidationTime::Ignore);
    let result = evaluator.evaluate_with_options(
        &certificate(EXAMPLE_SERVER),
        PolicyRegistry::x509(),
        Some(chain.as_slice()),
        &options,
    );
    assert_eq!(result.verdict(), Verdict::Proceed);
}

#[test]
fn user_override_rescues_untrusted_root() {
    let preferences = PreferenceStore::new(MemoryPersistence::new());
    let sgx_only = AnchorSet::new(&[certificate(SGX_ROOT_CA)]).expect("Failed decoding anchors");
    let evaluator = TrustEvaluator::new(sgx_only, &preferences);
    let chain = [certificate(EXAMPLE_ISSUING_CA), certificate(EXAMPLE_ROOT_CA)];
    let server = certificate(EXAMPLE_SERVER);
    let options = at_now().with_hostname("www.example.com");

    let result = evaluator.evaluate_with_options(
        &server,
        PolicyRegistry::ssl(),
        Some(chain.as_slice()),
        &options,
    );
    assert_eq!(result.verdict(), Verdict::RecoverableFailure);
    assert_eq!(
        result.explanation(),
        "SSL policy: recoverable trust failure (root \"Example Trust Root CA\" is not trusted)"
    );

    preferences
        .set_user_trust_override(server.identity(), PolicyRegistry::ssl(), TrustSetting::Proceed)
        .expect("Failed setting override");
    let result = evaluator.evaluate_with_options(
        &server,
        PolicyRegistry::ssl(),
        Some(chain.as_slice()),
        &options,
    );
    assert_eq!(result.verdict(), Verdict::Proceed);
    assert_eq!(result.explanation(), "SSL policy: proceed (user specified)");
    assert_eq!(result.evaluated_chain(), &[server.clone()]);

    // Only the SSL decision was recorded
    let result = evaluator.evaluate_with_options(
        &server,
        PolicyRegistry::x509(),
        Some(chain.as_slice()),
        &options,
    );
    assert_eq!(result.verdict(), Verdict::RecoverableFailure);

    preferences
        .remove_user_trust_override(server.identity(), PolicyRegistry::ssl())
        .expect("Failed removing override");
    let result = evaluator.evaluate_with_options(
        &server,
        PolicyRegistry::ssl(),
        Some(chain.as_slice()),
        &options,
    );
    assert_eq!(result.verdict(), Verdict::RecoverableFailure);
}

#[test]
fn user_deny_beats_valid_chain() {
    let preferences = PreferenceStore::new(MemoryPersistence::new());
    let evaluator = TrustEvaluator::new(anchors(), &preferences);
    let leaf = certificate(SGX_LEAF);
    let chain = [certificate(SGX_PROCESSOR_CA)];

    preferences
        .set_user_trust_override(leaf.identity(), PolicyRegistry::x509(), TrustSetting::Deny)
        .expect("Failed setting override");

    let result = evaluator.evaluate_with_options(
        &leaf,
        PolicyRegistry::x509(),
        Some(chain.as_slice()),
        &at_now(),
    );
    assert_eq!(result.verdict(), Verdict::Deny);
    assert_eq!(result.explanation(), "X.509 policy: deny (user specified)");
}

#[test]
fn leaf_without_intermediates() {
    let preferences = PreferenceStore::new(MemoryPersistence::new());
    let evaluator = TrustEvaluator::new(anchors(), &preferences);
    let leaf = certificate(SGX_LEAF);

    let result = evaluator.evaluate_with_options(&leaf, PolicyRegistry::x509(), None, &at_now());
    assert_eq!(result.verdict(), Verdict::RecoverableFailure);
    assert_eq!(
        result.explanation(),
        "X.509 policy: recoverable trust failure (issuer of \"Intel SGX PCK Certificate\" was not found)"
    );
    assert_eq!(result.evaluated_chain(), &[leaf]);
}

#[test]
fn unsupported_signature_algorithm() {
    let preferences = PreferenceStore::new(MemoryPersistence::new());
    let rsa_anchors =
        AnchorSet::new(&[certificate(EXAMPLE_RSA_ROOT_CA)]).expect("Failed decoding anchors");
    let evaluator = TrustEvaluator::new(rsa_anchors, &preferences);

    let result = evaluator.evaluate_with_options(
        &certificate(EXAMPLE_RSA_ISSUED),
        PolicyRegistry::x509(),
        None,
        &at_now(),
    );
    assert_eq!(result.verdict(), Verdict::OtherError);
    assert_eq!(
        result.explanation(),
        "X.509 policy: other error (Unsupported signature or key algorithm: signature algorithm 1.2.840.113549.1.1.11)"
    );
}

#[test]
fn anchors_from_config() {
    let json = serde_json::json!({
        "anchors": [EXAMPLE_ROOT_CA],
        "max_chain_depth": 1,
    })
    .to_string();
    let config = AnchorConfig::from_json(&json).expect("Failed parsing config");
    let anchors = AnchorSet::try_from(&config).expect("Failed decoding anchors");
    let preferences = PreferenceStore::new(MemoryPersistence::new());
    let evaluator = TrustEvaluator::new(anchors, &preferences);
    let chain = [certificate(EXAMPLE_ISSUING_CA)];

    let result = evaluator.evaluate_with_options(
        &certificate(EXAMPLE_SERVER),
        PolicyRegistry::x509(),
        Some(chain.as_slice()),
        &at_now(),
    );
    assert_eq!(result.verdict(), Verdict::RecoverableFailure);
    assert_eq!(
        result.explanation(),
        "X.509 policy: recoverable trust failure (chain is longer than 1 certificates)"
    );
}

#[test]
fn rekeyed_root_alongside_the_original() {
    let anchors = AnchorSet::new(&[
        certificate(EXAMPLE_REKEYED_ROOT_CA),
        certificate(EXAMPLE_ROOT_CA),
    ])
    .expect("Failed decoding anchors");
    let preferences = PreferenceStore::new(MemoryPersistence::new());
    let evaluator = TrustEvaluator::new(anchors, &preferences);
    let server = certificate(EXAMPLE_SERVER);
    let issuing = certificate(EXAMPLE_ISSUING_CA);
    let chain = [certificate(EXAMPLE_RENEWED_ISSUING_CA), issuing.clone()];

    let result = evaluator.evaluate_with_options(
        &server,
        PolicyRegistry::x509(),
        Some(chain.as_slice()),
        &at_now(),
    );
    assert_eq!(result.verdict(), Verdict::Proceed);
    assert_eq!(result.explanation(), "X.509 policy: proceed");
    assert_eq!(
        result.evaluated_chain(),
        &[server, issuing, certificate(EXAMPLE_ROOT_CA)]
    );
}

#[test]
fn cancelled_evaluation_has_no_verdict() {
    let preferences = PreferenceStore::new(MemoryPersistence::new());
    let evaluator = TrustEvaluator::new(anchors(), &preferences);
    let token = CancellationToken::new();
    token.cancel();

    let result = evaluator.evaluate_cancellable(
        &certificate(SGX_LEAF),
        PolicyRegistry::x509(),
        Some([certificate(SGX_PROCESSOR_CA)].as_slice()),
        &at_now(),
        &token,
    );
    assert_eq!(result, Err(Cancelled));
}

#[test]
fn concurrent_evaluations_share_certificates() {
    let preferences = PreferenceStore::new(MemoryPersistence::new());
    let evaluator = TrustEvaluator::new(anchors(), &preferences);
    let leaf = certificate(SGX_LEAF);
    let chain = [certificate(SGX_PROCESSOR_CA)];

    let verdicts = std::thread::scope(|scope| {
        let handles = (0..4)
            .map(|_| {
                scope.spawn(|| {
                    evaluator
                        .evaluate_with_options(
                            &leaf,
                            PolicyRegistry::x509(),
                            Some(chain.as_slice()),
                            &at_now(),
                        )
                        .verdict()
                })
            })
            .collect::<Vec<_>>();
        handles
            .into_iter()
            .map(|handle| handle.join().expect("Evaluation thread panicked"))
            .collect::<Vec<_>>()
    });

    assert_eq!(verdicts, vec![Verdict::Proceed; 4]);
}
