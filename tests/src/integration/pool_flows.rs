//! Pool reuse as seen through the public API.

use std::sync::Arc;
use std::time::Duration;

use jeri_secure_endpoint::{
    Constraint, ConstraintSet, ConnectionManager, ControlledTimeSource, CountingProvider,
    Endpoint, ProviderTag, SecureEndpointApi,
};

fn setup(provider: CountingProvider) -> (Arc<CountingProvider>, Arc<dyn SecureEndpointApi>) {
    let provider = Arc::new(provider);
    let manager = ConnectionManager::builder(Arc::new(ControlledTimeSource::new(1_000)))
        .provider(provider.clone())
        .build()
        .unwrap();
    let api: Arc<dyn SecureEndpointApi> = Arc::new(manager);
    (provider, api)
}

fn counting() -> CountingProvider {
    CountingProvider::new(
        ProviderTag::new("counting"),
        Arc::new(ControlledTimeSource::new(1_000)),
    )
}

fn endpoint() -> Endpoint {
    Endpoint::new("server.example", 4160, ProviderTag::new("counting"))
}

#[tokio::test]
async fn test_connections_are_reused_only_for_negotiated_requirements() {
    struct Step {
        requirements: Vec<Constraint>,
        connects_after: usize,
    }

    let steps = vec![
        Step {
            requirements: vec![Constraint::Integrity(true), Constraint::Confidentiality(true)],
            connects_after: 1,
        },
        Step {
            requirements: vec![Constraint::Integrity(true)],
            connects_after: 1,
        },
        Step {
            requirements: vec![Constraint::Confidentiality(true)],
            connects_after: 1,
        },
        Step {
            requirements: vec![Constraint::ClientAuthentication(false)],
            connects_after: 2,
        },
        Step {
            requirements: vec![
                Constraint::ClientAuthentication(false),
                Constraint::Integrity(true),
            ],
            connects_after: 3,
        },
        Step {
            requirements: vec![],
            connects_after: 3,
        },
    ];

    let (provider, api) = setup(counting());
    for (i, step) in steps.into_iter().enumerate() {
        let constraints = ConstraintSet::requiring(step.requirements).unwrap();
        let lease = api.connect(&endpoint(), &constraints).await.unwrap();
        assert_eq!(lease.call(b"ping").await.unwrap(), b"ping".to_vec());
        assert_eq!(provider.connects(), step.connects_after, "step {i}");
    }
    assert_eq!(api.stats().established, 3);
    api.shutdown();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_parallel_callers_share_one_handshake() {
    let (provider, api) = setup(counting().with_handshake_delay(Duration::from_millis(100)));
    let constraints = ConstraintSet::requiring([Constraint::Integrity(true)]).unwrap();

    let tasks: Vec<_> = (0..8)
        .map(|_| {
            let api = api.clone();
            let constraints = constraints.clone();
            tokio::spawn(async move {
                let lease = api.connect(&endpoint(), &constraints).await?;
                Ok::<_, jeri_secure_endpoint::NegotiationError>(lease.id())
            })
        })
        .collect();

    let mut ids = Vec::new();
    for task in tasks {
        ids.push(task.await.unwrap().unwrap());
    }
    ids.dedup();
    assert_eq!(ids.len(), 1);
    assert_eq!(provider.connects(), 1);
    api.shutdown();
}
