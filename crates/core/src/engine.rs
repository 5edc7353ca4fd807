//! The comparison engine drives the catalog against both nodes.

use std::{
    collections::BTreeSet,
    sync::atomic::{AtomicBool, Ordering},
};

use futures::{StreamExt, future::ready, stream};
use rpc_dt_config::{ExecutionConfiguration, RunIgnored};
use rpc_dt_format::{
    case::{CaseIdx, TestCase},
    catalog::Catalog,
    filter::FilterList,
};
use rpc_dt_node_interaction::RpcNode;
use rpc_dt_report::{Classification, ReportAggregator, Reporter, RunSummary, Verdict};
use tokio::time::{Instant, timeout_at};
use tracing::{Instrument, debug, info, info_span, warn};

use crate::{HarnessError, classifier::classify};

pub const RUN_TIMEOUT_REASON: &str = "run timeout elapsed";
pub const FAIL_FAST_REASON: &str = "fail-fast";

/// What the engine does with a case of the catalog.
#[derive(Clone, Debug, PartialEq, Eq)]
enum Plan {
    Dispatch,
    Skip(String),
}

/// Runs every case of a catalog against the reference and the candidate node.
///
/// Both nodes are called concurrently for each case and at most `workers` cases are in flight at
/// any time. Verdicts are sent to the report aggregator as soon as they're known, which puts them
/// back in catalog order.
pub struct ComparisonEngine<N> {
    reference: N,
    candidate: N,
    configuration: ExecutionConfiguration,
    filter: FilterList,
}

impl<N: RpcNode + Sync> ComparisonEngine<N> {
    /// Creates the engine, refusing nodes that haven't been found to be ready.
    pub fn new(
        reference: N,
        candidate: N,
        configuration: ExecutionConfiguration,
    ) -> Result<Self, HarnessError> {
        for node in [&reference, &candidate] {
            if !node.is_ready() {
                return Err(HarnessError::NodeNotReady { role: node.role() });
            }
        }
        Ok(Self {
            reference,
            candidate,
            configuration,
            filter: FilterList::default(),
        })
    }

    pub fn with_filter(mut self, filter: FilterList) -> Self {
        self.filter = filter;
        self
    }

    /// Runs the catalog to completion and returns the summary of the run.
    pub async fn compare(&self, catalog: &Catalog) -> RunSummary {
        let (reporter, aggregator) = ReportAggregator::new().into_task();
        let ((), summary) = tokio::join!(self.run(catalog, &reporter), aggregator);
        summary.with_catalog_name(catalog.name.clone())
    }

    /// Runs the catalog, sending a verdict for every selected case to the reporter followed by the
    /// completion event.
    pub async fn run(&self, catalog: &Catalog, reporter: &Reporter) {
        let selected = catalog
            .iter()
            .filter_map(|(case_idx, case)| {
                let plan = self.plan(case)?;
                Some((case_idx, case, plan))
            })
            .collect::<Vec<_>>();
        info!(
            selected = selected.len(),
            excluded = catalog.len() - selected.len(),
            "Selected the cases to run"
        );

        let report = |verdict: Verdict| {
            if let Err(error) = reporter.report_verdict_event(verdict) {
                warn!("Failed to report a verdict: {error:#}");
            }
        };

        if let Err(error) = reporter
            .report_run_started_event(selected.iter().map(|(case_idx, ..)| *case_idx).collect())
        {
            warn!("Failed to report the start of the run: {error:#}");
        }

        let mut dispatched = Vec::new();
        for (case_idx, case, plan) in selected {
            match plan {
                Plan::Dispatch => dispatched.push((case_idx, case)),
                Plan::Skip(reason) => report(Verdict::skipped(case_idx, case.clone(), reason)),
            }
        }

        let fail_fast_triggered = AtomicBool::new(false);
        let mut finished = BTreeSet::<CaseIdx>::new();
        let driver = stream::iter(dispatched.iter())
            .map(|(case_idx, case)| self.execute_case(*case_idx, case, &fail_fast_triggered))
            .buffer_unordered(self.configuration.workers.max(1))
            .for_each(|verdict| {
                finished.insert(verdict.case_idx);
                report(verdict);
                ready(())
            });

        match self.configuration.run_timeout {
            Some(run_timeout) => {
                if timeout_at(Instant::now() + run_timeout, driver).await.is_err() {
                    warn!(?run_timeout, "The run timeout elapsed, abandoning the remaining cases");
                }
            }
            None => driver.await,
        }

        for (case_idx, case) in dispatched.iter() {
            if !finished.contains(case_idx) {
                report(Verdict::skipped(
                    *case_idx,
                    (*case).clone(),
                    RUN_TIMEOUT_REASON,
                ));
            }
        }

        if let Err(error) = reporter.report_completion_event() {
            warn!("Failed to report the completion of the run: {error:#}");
        }
    }

    /// Decides what to do with a case, [`None`] leaves it out of the run entirely.
    fn plan(&self, case: &TestCase) -> Option<Plan> {
        if !self.filter.authorize(&case.method) {
            return None;
        }
        if let Some(reason) = case.always_skipped() {
            return Some(Plan::Skip(reason.to_string()));
        }
        match (self.configuration.run_ignored, case.ignore.as_ref()) {
            (RunIgnored::Default, Some(reason)) => Some(Plan::Skip(reason.clone())),
            (RunIgnored::Default, None) => Some(Plan::Dispatch),
            (RunIgnored::IgnoredOnly, Some(_)) => Some(Plan::Dispatch),
            (RunIgnored::IgnoredOnly, None) => None,
            (RunIgnored::All, _) => Some(Plan::Dispatch),
        }
    }

    async fn execute_case(
        &self,
        case_idx: CaseIdx,
        case: &TestCase,
        fail_fast_triggered: &AtomicBool,
    ) -> Verdict {
        if self.configuration.fail_fast && fail_fast_triggered.load(Ordering::Relaxed) {
            return Verdict::skipped(case_idx, case.clone(), FAIL_FAST_REASON);
        }

        let span = info_span!("Comparing case", %case_idx, method = %case.method);
        let verdict = self.compare_case(case_idx, case).instrument(span).await;

        if self.configuration.fail_fast && verdict.classification == Classification::Mismatch {
            info!(%case_idx, "Fail-fast triggered, no further cases will be started");
            fail_fast_triggered.store(true, Ordering::Relaxed);
        }
        verdict
    }

    async fn compare_case(&self, case_idx: CaseIdx, case: &TestCase) -> Verdict {
        let timeout = case.timeout();
        let (reference, candidate) = tokio::join!(
            self.reference.call(&case.method, &case.params, timeout),
            self.candidate.call(&case.method, &case.params, timeout),
        );

        let (classification, diagnostic) = classify(&reference, &candidate, &case.policy);
        match classification {
            Classification::Match => debug!("Case matched"),
            Classification::Skipped => debug!(?diagnostic, "Case skipped"),
            Classification::Flake => warn!(?diagnostic, "Case flaked"),
            Classification::Mismatch => warn!(?diagnostic, "Case mismatched"),
        }

        Verdict::compared(
            case_idx,
            case.clone(),
            reference,
            candidate,
            classification,
            diagnostic,
        )
    }
}

#[cfg(test)]
mod tests {
    use std::{
        collections::HashMap,
        sync::{Arc, Mutex, atomic::AtomicUsize},
        time::Duration,
    };

    use rpc_dt_common::types::NodeRole;
    use rpc_dt_format::policy::EquivalencePolicy;
    use rpc_dt_node_interaction::{CallOutcome, CallResponse};
    use serde_json::{Value, json};

    use super::*;

    /// A node that answers every method with a canned response after a per-method latency.
    #[derive(Clone)]
    struct FakeNode {
        role: NodeRole,
        ready: bool,
        responses: HashMap<String, CallResponse>,
        latencies: HashMap<String, Duration>,
        calls: Arc<Mutex<Vec<String>>>,
    }

    impl FakeNode {
        fn new(role: NodeRole) -> Self {
            Self {
                role,
                ready: true,
                responses: Default::default(),
                latencies: Default::default(),
                calls: Default::default(),
            }
        }

        fn respond(mut self, method: &str, response: CallResponse) -> Self {
            self.responses.insert(method.to_string(), response);
            self
        }

        fn succeed(self, method: &str, value: Value) -> Self {
            self.respond(method, CallResponse::Success(value))
        }

        fn delay(mut self, method: &str, latency: Duration) -> Self {
            self.latencies.insert(method.to_string(), latency);
            self
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl RpcNode for FakeNode {
        fn role(&self) -> NodeRole {
            self.role
        }

        fn is_ready(&self) -> bool {
            self.ready
        }

        fn call(
            &self,
            method: &str,
            _: &[Value],
            _: Option<Duration>,
        ) -> impl Future<Output = CallOutcome> + Send {
            self.calls.lock().unwrap().push(method.to_string());
            let latency = self.latencies.get(method).copied().unwrap_or_default();
            let outcome = CallOutcome {
                origin: self.role,
                attempts: 1,
                response: self
                    .responses
                    .get(method)
                    .cloned()
                    .unwrap_or(CallResponse::Success(Value::Null)),
            };
            async move {
                tokio::time::sleep(latency).await;
                outcome
            }
        }
    }

    fn pair() -> (FakeNode, FakeNode) {
        (
            FakeNode::new(NodeRole::Reference),
            FakeNode::new(NodeRole::Candidate),
        )
    }

    fn engine(
        reference: FakeNode,
        candidate: FakeNode,
        configuration: ExecutionConfiguration,
    ) -> ComparisonEngine<FakeNode> {
        ComparisonEngine::new(reference, candidate, configuration).unwrap()
    }

    fn case(method: &str) -> TestCase {
        TestCase::new(method, vec![], EquivalencePolicy::ExactMatch)
    }

    fn classifications(summary: &RunSummary) -> Vec<(usize, Classification)> {
        summary
            .cases
            .iter()
            .map(|verdict| (verdict.case_idx.into_inner(), verdict.classification))
            .collect()
    }

    #[tokio::test]
    async fn verdicts_are_in_catalog_order_regardless_of_latency() {
        let (mut reference, mut candidate) = pair();
        let mut cases = Vec::new();
        for idx in 0..6u64 {
            let method = format!("Filecoin.Method{idx}");
            let latency = Duration::from_millis((6 - idx) * 15);
            reference = reference.delay(&method, latency);
            candidate = candidate.delay(&method, Duration::from_millis(idx * 5));
            cases.push(case(&method));
        }
        let catalog = Catalog::from_cases(cases).unwrap();

        let summary = engine(reference, candidate, ExecutionConfiguration::default())
            .compare(&catalog)
            .await;

        assert_eq!(
            classifications(&summary),
            (0..6).map(|idx| (idx, Classification::Match)).collect::<Vec<_>>()
        );
    }

    #[tokio::test]
    async fn both_nodes_are_awaited_even_when_one_fails() {
        let (reference, candidate) = pair();
        let reference = reference.respond(
            "Filecoin.ChainHead",
            CallResponse::TransportError("connection refused".to_string()),
        );
        let calls = candidate.calls.clone();
        let catalog = Catalog::from_cases(vec![case("Filecoin.ChainHead")]).unwrap();

        let summary = engine(reference, candidate, ExecutionConfiguration::default())
            .compare(&catalog)
            .await;

        assert_eq!(summary.flaked, 1);
        assert_eq!(calls.lock().unwrap().as_slice(), ["Filecoin.ChainHead"]);
        let verdict = &summary.cases[0];
        assert!(verdict.reference.is_some() && verdict.candidate.is_some());
    }

    #[tokio::test]
    async fn skipped_cases_are_never_dispatched() {
        let (reference, candidate) = pair();
        let catalog = Catalog::from_cases(vec![
            TestCase::new("Filecoin.NetPeers", vec![], EquivalencePolicy::AlwaysSkip),
            case("Filecoin.ChainHead").ignored("known to differ"),
            case("Filecoin.Version"),
        ])
        .unwrap();
        let engine = engine(reference, candidate, ExecutionConfiguration::default());

        let summary = engine.compare(&catalog).await;

        assert_eq!(
            classifications(&summary),
            vec![
                (0, Classification::Skipped),
                (1, Classification::Skipped),
                (2, Classification::Match),
            ]
        );
        assert_eq!(
            summary.cases[1].diagnostic.as_deref(),
            Some("known to differ")
        );
        assert_eq!(engine.reference.calls(), vec!["Filecoin.Version"]);
        assert_eq!(engine.candidate.calls(), vec!["Filecoin.Version"]);
    }

    #[tokio::test]
    async fn ignored_cases_follow_the_run_ignored_mode() {
        let catalog = Catalog::from_cases(vec![
            case("Filecoin.ChainHead").ignored("known to differ"),
            case("Filecoin.Version"),
            TestCase::new("Filecoin.NetPeers", vec![], EquivalencePolicy::AlwaysSkip)
                .ignored("peers"),
        ])
        .unwrap();

        let run = |run_ignored| {
            let (reference, candidate) = pair();
            let catalog = catalog.clone();
            async move {
                let configuration = ExecutionConfiguration {
                    run_ignored,
                    ..Default::default()
                };
                classifications(
                    &engine(reference, candidate, configuration)
                        .compare(&catalog)
                        .await,
                )
            }
        };

        assert_eq!(
            run(RunIgnored::IgnoredOnly).await,
            vec![(0, Classification::Match), (2, Classification::Skipped)]
        );
        assert_eq!(
            run(RunIgnored::All).await,
            vec![
                (0, Classification::Match),
                (1, Classification::Match),
                (2, Classification::Skipped),
            ]
        );
    }

    #[tokio::test]
    async fn filtered_out_cases_are_not_counted() {
        let (reference, candidate) = pair();
        let catalog = Catalog::from_cases(vec![
            case("Filecoin.ChainHead"),
            case("Filecoin.StateNetworkName"),
            case("Filecoin.ChainGetBlock"),
        ])
        .unwrap();

        let summary = engine(reference, candidate, ExecutionConfiguration::default())
            .with_filter(FilterList::default().allow("Chain").reject("GetBlock"))
            .compare(&catalog)
            .await;

        assert_eq!(summary.total, 1);
        assert_eq!(summary.cases[0].method(), "Filecoin.ChainHead");
    }

    #[tokio::test]
    async fn fail_fast_skips_the_cases_after_a_mismatch() {
        let (reference, candidate) = pair();
        let reference = reference.succeed("Filecoin.ChainHead", json!("H1"));
        let candidate = candidate.succeed("Filecoin.ChainHead", json!("H2"));
        let catalog = Catalog::from_cases(vec![
            case("Filecoin.ChainHead"),
            case("Filecoin.Version"),
            case("Filecoin.StateNetworkName"),
        ])
        .unwrap();
        let configuration = ExecutionConfiguration {
            workers: 1,
            fail_fast: true,
            ..Default::default()
        };

        let summary = engine(reference, candidate, configuration)
            .compare(&catalog)
            .await;

        assert_eq!(
            classifications(&summary),
            vec![
                (0, Classification::Mismatch),
                (1, Classification::Skipped),
                (2, Classification::Skipped),
            ]
        );
        assert_eq!(summary.cases[1].diagnostic.as_deref(), Some(FAIL_FAST_REASON));
    }

    #[tokio::test]
    async fn run_timeout_skips_the_unfinished_cases() {
        let (reference, candidate) = pair();
        let reference = reference.delay("Filecoin.StateCompute", Duration::from_secs(30));
        let catalog = Catalog::from_cases(vec![
            case("Filecoin.StateCompute"),
            case("Filecoin.Version"),
        ])
        .unwrap();
        let configuration = ExecutionConfiguration {
            run_timeout: Some(Duration::from_millis(200)),
            ..Default::default()
        };

        let summary = engine(reference, candidate, configuration)
            .compare(&catalog)
            .await;

        assert_eq!(
            classifications(&summary),
            vec![(0, Classification::Skipped), (1, Classification::Match)]
        );
        assert_eq!(
            summary.cases[0].diagnostic.as_deref(),
            Some(RUN_TIMEOUT_REASON)
        );
    }

    #[tokio::test]
    async fn workers_bound_the_cases_in_flight() {
        let in_flight = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        #[derive(Clone)]
        struct CountingNode {
            role: NodeRole,
            in_flight: Arc<AtomicUsize>,
            peak: Arc<AtomicUsize>,
        }

        impl RpcNode for CountingNode {
            fn role(&self) -> NodeRole {
                self.role
            }

            fn is_ready(&self) -> bool {
                true
            }

            fn call(
                &self,
                _: &str,
                _: &[Value],
                _: Option<Duration>,
            ) -> impl Future<Output = CallOutcome> + Send {
                let (role, in_flight, peak) =
                    (self.role, self.in_flight.clone(), self.peak.clone());
                async move {
                    let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(20)).await;
                    in_flight.fetch_sub(1, Ordering::SeqCst);
                    CallOutcome {
                        origin: role,
                        attempts: 1,
                        response: CallResponse::Success(Value::Null),
                    }
                }
            }
        }

        let node = |role| CountingNode {
            role,
            in_flight: in_flight.clone(),
            peak: peak.clone(),
        };
        let catalog =
            Catalog::from_cases((0..10).map(|idx| case(&format!("M{idx}"))).collect()).unwrap();
        let configuration = ExecutionConfiguration {
            workers: 2,
            ..Default::default()
        };

        let summary = ComparisonEngine::new(
            node(NodeRole::Reference),
            node(NodeRole::Candidate),
            configuration,
        )
        .unwrap()
        .compare(&catalog)
        .await;

        assert_eq!(summary.matched, 10);
        // Two cases with two calls each.
        assert!(peak.load(Ordering::SeqCst) <= 4);
    }

    #[test]
    fn nodes_that_are_not_ready_are_refused() {
        let (reference, mut candidate) = pair();
        candidate.ready = false;

        let result = ComparisonEngine::new(reference, candidate, ExecutionConfiguration::default());

        assert!(matches!(
            result,
            Err(HarnessError::NodeNotReady {
                role: NodeRole::Candidate
            })
        ));
    }

    #[tokio::test]
    async fn the_run_completes_when_the_aggregator_is_gone() {
        let (reference, candidate) = pair();
        let catalog = Catalog::from_cases(vec![case("Filecoin.ChainHead")]).unwrap();
        let engine = engine(reference, candidate, ExecutionConfiguration::default());
        let (reporter, aggregator) = ReportAggregator::new().into_task();
        drop(aggregator);

        engine.run(&catalog, &reporter).await;

        assert_eq!(engine.reference.calls(), vec!["Filecoin.ChainHead"]);
        assert!(reporter.report_completion_event().is_err());
    }
}
