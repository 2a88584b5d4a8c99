//! Модуль маршрутизации запросов по конечным точкам
//!
//! Роутер хранит статистику успехов и ошибок каждой точки, временно
//! исключает точки после ошибок и упорядочивает кандидатов так, чтобы
//! первыми шли самые надежные.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use log::{debug, info, warn};
use parking_lot::Mutex;

use crate::config::RouterConfig;
use crate::error::{Result, TtsMixdownError};
use crate::tts::endpoint::{self, Endpoint};

/// Разница в доле успехов, при которой точки считаются равными
const RATE_TIE_WINDOW: f64 = 0.1;

/// Статистика одной конечной точки
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EndpointStats {
    pub successes: u32,
    pub failures: u32,
    pub last_used_at: Option<Instant>,
    pub banned_until: Option<Instant>,
}

impl EndpointStats {
    /// Доля успехов со сглаживанием `s / (s + f + 1)`
    pub fn success_rate(&self) -> f64 {
        self.successes as f64 / (self.successes as f64 + self.failures as f64 + 1.0)
    }

    /// Доступна ли точка в момент `now`
    pub fn is_available(&self, now: Instant) -> bool {
        self.banned_until.map_or(true, |until| now >= until)
    }
}

/// Снимок состояния точки для диагностики
#[derive(Debug, Clone)]
pub struct EndpointSnapshot {
    pub id: String,
    pub name: String,
    pub custom: bool,
    pub stats: EndpointStats,
    /// Сколько еще длится бан
    pub ban_remaining: Option<Duration>,
}

fn compare(a: &EndpointStats, b: &EndpointStats) -> Ordering {
    let (rate_a, rate_b) = (a.success_rate(), b.success_rate());
    if (rate_a - rate_b).abs() > RATE_TIE_WINDOW {
        return rate_b.partial_cmp(&rate_a).unwrap_or(Ordering::Equal);
    }
    a.failures
        .cmp(&b.failures)
        .then_with(|| a.last_used_at.cmp(&b.last_used_at))
}

/// Устойчивая сортировка вставками.
///
/// Сравнение с окном равенства не транзитивно, поэтому используется
/// попарная сортировка, которая не требует полного порядка.
fn rank(candidates: &mut [(Arc<Endpoint>, EndpointStats)]) {
    for i in 1..candidates.len() {
        let mut j = i;
        while j > 0 && compare(&candidates[j - 1].1, &candidates[j].1) == Ordering::Greater {
            candidates.swap(j - 1, j);
            j -= 1;
        }
    }
}

struct RouterState {
    /// Пользовательские точки, затем встроенные
    endpoints: Vec<Arc<Endpoint>>,
    stats: HashMap<String, EndpointStats>,
}

/// Роутер конечных точек
pub struct EndpointRouter {
    config: RouterConfig,
    builtin: Vec<Arc<Endpoint>>,
    state: Mutex<RouterState>,
}

impl EndpointRouter {
    /// Роутер со встроенными точками и пользовательскими прокси
    pub fn new(config: RouterConfig, custom_proxies: &[String]) -> Self {
        let router = Self::with_endpoints(config, endpoint::default_endpoints());
        router.set_custom_proxies(custom_proxies);
        router
    }

    /// Роутер с явно заданным списком точек
    pub fn with_endpoints(config: RouterConfig, endpoints: Vec<Endpoint>) -> Self {
        let builtin: Vec<Arc<Endpoint>> = endpoints.into_iter().map(Arc::new).collect();
        let stats = builtin
            .iter()
            .map(|e| (e.id.clone(), EndpointStats::default()))
            .collect();
        Self {
            config,
            state: Mutex::new(RouterState {
                endpoints: builtin.clone(),
                stats,
            }),
            builtin,
        }
    }

    /// Заменить пользовательские прокси.
    ///
    /// Статистика точек с сохранившимися идентификаторами не сбрасывается.
    /// Возвращает количество пользовательских точек.
    pub fn set_custom_proxies(&self, urls: &[String]) -> usize {
        let custom: Vec<Arc<Endpoint>> = endpoint::custom_endpoints(urls)
            .into_iter()
            .map(Arc::new)
            .collect();
        let count = custom.len();

        let mut state = self.state.lock();
        for e in &custom {
            state.stats.entry(e.id.clone()).or_default();
        }
        state.endpoints = custom.into_iter().chain(self.builtin.iter().cloned()).collect();
        info!("Router configured with {} custom and {} built-in endpoints", count, self.builtin.len());
        count
    }

    /// Кандидаты в порядке убывания надежности
    pub fn select_candidates(&self) -> Result<Vec<Arc<Endpoint>>> {
        self.select_candidates_at(Instant::now())
    }

    /// То же, что [`select_candidates`](Self::select_candidates), в момент `now`
    pub fn select_candidates_at(&self, now: Instant) -> Result<Vec<Arc<Endpoint>>> {
        let mut candidates: Vec<(Arc<Endpoint>, EndpointStats)> = {
            let state = self.state.lock();
            state
                .endpoints
                .iter()
                .filter_map(|e| {
                    let stats = state.stats.get(&e.id)?;
                    stats.is_available(now).then(|| (e.clone(), stats.clone()))
                })
                .collect()
        };

        if candidates.is_empty() {
            return Err(TtsMixdownError::NoEndpointsAvailable);
        }

        rank(&mut candidates);
        debug!(
            "Candidates: {}",
            candidates.iter().map(|(e, _)| e.id.as_str()).collect::<Vec<_>>().join(", ")
        );
        Ok(candidates.into_iter().map(|(e, _)| e).collect())
    }

    /// Записать результат обращения к точке
    pub fn record_outcome(&self, id: &str, success: bool, status: Option<u16>) {
        self.record_outcome_at(id, success, status, Instant::now())
    }

    /// То же, что [`record_outcome`](Self::record_outcome), в момент `now`
    pub fn record_outcome_at(&self, id: &str, success: bool, status: Option<u16>, now: Instant) {
        let mut state = self.state.lock();
        let Some(stats) = state.stats.get_mut(id) else {
            debug!("Outcome for unknown endpoint {} ignored", id);
            return;
        };

        stats.last_used_at = Some(now);

        if success {
            stats.successes += 1;
            stats.failures = stats.failures.saturating_sub(1);
            if stats.banned_until.take().is_some() {
                info!("Endpoint {} recovered, ban lifted", id);
            }
            return;
        }

        stats.failures += 1;
        if matches!(status, Some(403) | Some(429)) {
            extend_ban(stats, now + Duration::from_secs(self.config.hard_ban_secs));
            warn!(
                "Endpoint {} banned for {}s (HTTP {})",
                id,
                self.config.hard_ban_secs,
                status.unwrap_or_default()
            );
        } else if stats.failures >= self.config.soft_ban_failures {
            extend_ban(stats, now + Duration::from_secs(self.config.soft_ban_secs));
            warn!(
                "Endpoint {} banned for {}s after {} failures",
                id, self.config.soft_ban_secs, stats.failures
            );
        }
    }

    /// Максимальное число кандидатов на один фрагмент
    pub fn attempt_limit(&self, candidates: usize) -> usize {
        candidates.min(self.config.max_attempts)
    }

    /// Состояние всех точек в базовом порядке
    pub fn snapshot(&self) -> Vec<EndpointSnapshot> {
        let now = Instant::now();
        let state = self.state.lock();
        state
            .endpoints
            .iter()
            .map(|e| {
                let stats = state.stats.get(&e.id).cloned().unwrap_or_default();
                let ban_remaining = stats
                    .banned_until
                    .and_then(|until| until.checked_duration_since(now))
                    .filter(|d| !d.is_zero());
                EndpointSnapshot {
                    id: e.id.clone(),
                    name: e.name.clone(),
                    custom: e.is_custom(),
                    stats,
                    ban_remaining,
                }
            })
            .collect()
    }

    /// Статистика одной точки
    pub fn stats(&self, id: &str) -> Option<EndpointStats> {
        self.state.lock().stats.get(id).cloned()
    }
}

/// Бан только продлевается; сокращает его лишь успешный ответ
fn extend_ban(stats: &mut EndpointStats, until: Instant) {
    stats.banned_until = Some(stats.banned_until.map_or(until, |current| current.max(until)));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tts::endpoint::{BackendClient, ProxyBase};

    fn endpoint(id: &str) -> Endpoint {
        Endpoint {
            id: id.to_string(),
            name: id.to_uppercase(),
            proxy: ProxyBase::CorsProxy,
            backend: BackendClient::Gtx,
        }
    }

    fn router(ids: &[&str]) -> EndpointRouter {
        EndpointRouter::with_endpoints(RouterConfig::default(), ids.iter().map(|id| endpoint(id)).collect())
    }

    fn ids(list: &[Arc<Endpoint>]) -> Vec<String> {
        list.iter().map(|e| e.id.clone()).collect()
    }

    #[test]
    fn test_soft_ban_after_three_failures() {
        let router = router(&["a", "b"]);
        let now = Instant::now();
        for _ in 0..3 {
            router.record_outcome_at("a", false, None, now);
        }

        assert_eq!(ids(&router.select_candidates_at(now).unwrap()), vec!["b"]);
        let later = now + Duration::from_secs(59);
        assert_eq!(ids(&router.select_candidates_at(later).unwrap()), vec!["b"]);
        let after = now + Duration::from_secs(60);
        assert!(ids(&router.select_candidates_at(after).unwrap()).contains(&"a".to_string()));
    }

    #[test]
    fn test_hard_ban_on_rate_limit() {
        let router = router(&["a", "b"]);
        let now = Instant::now();
        router.record_outcome_at("a", false, Some(429), now);
        router.record_outcome_at("b", false, Some(403), now);

        let err = router.select_candidates_at(now + Duration::from_secs(299)).unwrap_err();
        assert!(matches!(err, TtsMixdownError::NoEndpointsAvailable));
        assert_eq!(router.select_candidates_at(now + Duration::from_secs(300)).unwrap().len(), 2);
    }

    #[test]
    fn test_soft_failure_keeps_longer_hard_ban() {
        let router = router(&["a", "b"]);
        let now = Instant::now();
        router.record_outcome_at("a", false, None, now);
        router.record_outcome_at("a", false, None, now);
        router.record_outcome_at("a", false, Some(429), now);
        let hard_until = router.stats("a").unwrap().banned_until.unwrap();
        assert_eq!(hard_until, now + Duration::from_secs(300));

        let later = now + Duration::from_secs(1);
        router.record_outcome_at("a", false, None, later);
        assert_eq!(router.stats("a").unwrap().banned_until, Some(hard_until));

        let after_soft = later + Duration::from_secs(61);
        assert_eq!(ids(&router.select_candidates_at(after_soft).unwrap()), vec!["b"]);
    }

    #[test]
    fn test_success_heals_and_clears_ban() {
        let router = router(&["a"]);
        let now = Instant::now();
        for _ in 0..4 {
            router.record_outcome_at("a", false, None, now);
        }
        assert!(router.select_candidates_at(now).is_err());

        router.record_outcome_at("a", true, None, now);
        let stats = router.stats("a").unwrap();
        assert_eq!(stats.failures, 3);
        assert_eq!(stats.successes, 1);
        assert!(stats.banned_until.is_none());
        assert_eq!(router.select_candidates_at(now).unwrap().len(), 1);

        router.record_outcome_at("a", true, None, now);
        router.record_outcome_at("a", true, None, now);
        router.record_outcome_at("a", true, None, now);
        router.record_outcome_at("a", true, None, now);
        assert_eq!(router.stats("a").unwrap().failures, 0);
    }

    #[test]
    fn test_ranking_by_rate_then_failures_then_recency() {
        let router = router(&["a", "b", "c", "d"]);
        let t0 = Instant::now();
        // a: высокая доля успехов
        for _ in 0..5 {
            router.record_outcome_at("a", true, None, t0);
        }
        // b и c: одна ошибка, c использовалась раньше
        router.record_outcome_at("c", false, None, t0);
        router.record_outcome_at("b", false, None, t0 + Duration::from_secs(1));
        // d: не использовалась

        let order = ids(&router.select_candidates_at(t0 + Duration::from_secs(2)).unwrap());
        assert_eq!(order, vec!["a", "d", "c", "b"]);
    }

    #[test]
    fn test_custom_endpoints_come_first() {
        let router = EndpointRouter::new(RouterConfig::default(), &["https://proxy.local/?u=".to_string()]);
        let order = ids(&router.select_candidates().unwrap());
        assert_eq!(order.len(), 12);
        assert_eq!(&order[..3], &["custom_0_gtx", "custom_0_webapp", "custom_0_dict"]);
        assert_eq!(order[3], "ao_gtx");
    }

    #[test]
    fn test_custom_stats_survive_reconfiguration() {
        let urls = vec!["https://proxy.local/?u=".to_string()];
        let router = EndpointRouter::new(RouterConfig::default(), &urls);
        router.record_outcome("custom_0_gtx", true, None);

        assert_eq!(router.set_custom_proxies(&urls), 3);
        assert_eq!(router.stats("custom_0_gtx").unwrap().successes, 1);

        assert_eq!(router.set_custom_proxies(&[]), 0);
        let snapshot = router.snapshot();
        assert_eq!(snapshot.len(), 9);
        assert!(snapshot.iter().all(|s| !s.custom));
    }

    #[test]
    fn test_attempt_limit() {
        let router = router(&["a"]);
        assert_eq!(router.attempt_limit(3), 3);
        assert_eq!(router.attempt_limit(25), 10);
    }
}
