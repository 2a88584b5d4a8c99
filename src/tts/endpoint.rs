//! Модуль конечных точек синтеза
//!
//! Конечная точка = прокси + вариант клиента переводчика. URL строится
//! чистой функцией [`build_url`], список точек перечисляется один раз
//! при конфигурации.

use std::fmt;

use log::warn;
use urlencoding::encode;

/// Вариант клиента сервиса синтеза
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendClient {
    Gtx,
    TwOb,
    WebApp,
    T,
    Dict,
}

impl BackendClient {
    /// Значение параметра `client`
    pub fn client_param(&self) -> &'static str {
        match self {
            BackendClient::Gtx => "gtx",
            BackendClient::TwOb => "tw-ob",
            BackendClient::WebApp => "webapp",
            BackendClient::T => "t",
            BackendClient::Dict => "dict-chrome-ex",
        }
    }

    fn host(&self) -> &'static str {
        match self {
            BackendClient::TwOb | BackendClient::WebApp => "translate.google.com",
            _ => "translate.googleapis.com",
        }
    }

    /// Короткий суффикс для идентификаторов
    pub fn suffix(&self) -> &'static str {
        match self {
            BackendClient::Gtx => "gtx",
            BackendClient::TwOb => "tw_ob",
            BackendClient::WebApp => "webapp",
            BackendClient::T => "t",
            BackendClient::Dict => "dict",
        }
    }

    fn label(&self) -> &'static str {
        match self {
            BackendClient::Gtx => "GTX",
            BackendClient::TwOb => "TW-OB",
            BackendClient::WebApp => "WebApp",
            BackendClient::T => "t",
            BackendClient::Dict => "Dict",
        }
    }

    /// URL прямого запроса к сервису
    pub fn url(&self, text: &str, language: &str) -> String {
        format!(
            "https://{}/translate_tts?ie=UTF-8&q={}&tl={}&client={}",
            self.host(),
            encode(text),
            encode(language),
            self.client_param()
        )
    }
}

/// Прокси, через который идет запрос
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProxyBase {
    /// Поддерживает сброс кэша через метку времени
    AllOrigins,
    CorsProxy,
    CodeTabs,
    /// Пользовательский префикс, к которому дописывается закодированный URL
    Custom(String),
}

impl ProxyBase {
    fn id_prefix(&self) -> &'static str {
        match self {
            ProxyBase::AllOrigins => "ao",
            ProxyBase::CorsProxy => "cp",
            ProxyBase::CodeTabs => "ct",
            ProxyBase::Custom(_) => "custom",
        }
    }

    fn label(&self) -> &'static str {
        match self {
            ProxyBase::AllOrigins => "AllOrigins",
            ProxyBase::CorsProxy => "CorsProxy",
            ProxyBase::CodeTabs => "CodeTabs",
            ProxyBase::Custom(_) => "Custom",
        }
    }
}

/// Построить URL запроса для пары (прокси, клиент).
///
/// `timestamp_ms` используется только AllOrigins для обхода кэша прокси.
pub fn build_url(proxy: &ProxyBase, backend: BackendClient, text: &str, language: &str, timestamp_ms: i64) -> String {
    let target = backend.url(text, language);
    let wrapped = encode(&target);
    match proxy {
        ProxyBase::AllOrigins => format!("https://api.allorigins.win/raw?url={}&d={}", wrapped, timestamp_ms),
        ProxyBase::CorsProxy => format!("https://corsproxy.io/?{}", wrapped),
        ProxyBase::CodeTabs => format!("https://api.codetabs.com/v1/proxy?quest={}", wrapped),
        ProxyBase::Custom(base) => format!("{}{}", base, wrapped),
    }
}

/// Конечная точка синтеза
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub id: String,
    pub name: String,
    pub proxy: ProxyBase,
    pub backend: BackendClient,
}

impl Endpoint {
    fn builtin(proxy: ProxyBase, backend: BackendClient) -> Self {
        Self {
            id: format!("{}_{}", proxy.id_prefix(), backend.suffix()),
            name: format!("{} + {}", proxy.label(), backend.label()),
            proxy,
            backend,
        }
    }

    /// Пользовательская ли это точка
    pub fn is_custom(&self) -> bool {
        matches!(self.proxy, ProxyBase::Custom(_))
    }

    /// URL для текста с текущей меткой времени
    pub fn url_for(&self, text: &str, language: &str) -> String {
        build_url(&self.proxy, self.backend, text, language, chrono::Utc::now().timestamp_millis())
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}]", self.name, self.id)
    }
}

/// Встроенные конечные точки в базовом порядке
pub fn default_endpoints() -> Vec<Endpoint> {
    use BackendClient::*;

    let mut endpoints = Vec::new();
    for backend in [Gtx, WebApp, Dict, T] {
        endpoints.push(Endpoint::builtin(ProxyBase::AllOrigins, backend));
    }
    for backend in [Gtx, WebApp, Dict] {
        endpoints.push(Endpoint::builtin(ProxyBase::CorsProxy, backend));
    }
    for backend in [Gtx, Dict] {
        endpoints.push(Endpoint::builtin(ProxyBase::CodeTabs, backend));
    }
    endpoints
}

/// Точки из пользовательских прокси: по три варианта клиента на каждый URL.
///
/// Пустые строки и адреса не на http(s) пропускаются, но индекс в
/// идентификаторе остается позицией во входном списке.
pub fn custom_endpoints(urls: &[String]) -> Vec<Endpoint> {
    let mut endpoints = Vec::new();
    for (index, url) in urls.iter().enumerate() {
        let base = url.trim();
        if base.is_empty() {
            continue;
        }
        if !base.starts_with("http") {
            warn!("Ignoring custom proxy without http(s) scheme: {}", base);
            continue;
        }

        for backend in [BackendClient::Gtx, BackendClient::WebApp, BackendClient::Dict] {
            endpoints.push(Endpoint {
                id: format!("custom_{}_{}", index, backend.suffix()),
                name: format!("Custom {} ({})", index + 1, backend.suffix()),
                proxy: ProxyBase::Custom(base.to_string()),
                backend,
            });
        }
    }
    endpoints
}
