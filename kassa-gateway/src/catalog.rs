//! Provider catalog
//!
//! Fetches the payment methods available for an amount and groups them for
//! the checkout page. Failures never escape: the caller gets
//! [`Catalog::Unavailable`] and renders a message instead.

use kassa_psp::{GroupTag, Language, Provider, PspClient};
use serde::Serialize;
use std::sync::Arc;

/// Providers sharing one group tag, in PSP order
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProviderGroup {
    pub tag: String,
    pub label: String,
    pub providers: Vec<Provider>,
}

/// Outcome of a catalog lookup
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "status")]
pub enum Catalog {
    Available { groups: Vec<ProviderGroup> },
    Unavailable { error: String },
}

impl Catalog {
    pub fn groups(&self) -> &[ProviderGroup] {
        match self {
            Self::Available { groups } => groups,
            Self::Unavailable { .. } => &[],
        }
    }

    /// Find a provider by id in any group
    pub fn provider(&self, id: &str) -> Option<&Provider> {
        self.groups()
            .iter()
            .flat_map(|g| g.providers.iter())
            .find(|p| p.id == id)
    }
}

/// Partition providers by group tag, keeping first-seen group order and
/// provider order within each group.
pub fn group_providers(providers: Vec<Provider>, language: Language) -> Vec<ProviderGroup> {
    let mut groups: Vec<ProviderGroup> = Vec::new();
    for provider in providers {
        match groups.iter_mut().find(|g| g.tag == provider.group) {
            Some(group) => group.providers.push(provider),
            None => groups.push(ProviderGroup {
                tag: provider.group.clone(),
                label: group_label(&provider.group_tag(), language),
                providers: vec![provider],
            }),
        }
    }
    groups
}

/// Heading of a provider group; unknown tags use the raw tag
pub fn group_label(tag: &GroupTag, language: Language) -> String {
    let label = match (tag, language) {
        (GroupTag::Mobile, Language::FI) => "Mobiilimaksutavat",
        (GroupTag::Mobile, Language::SV) => "Mobila betalningsmetoder",
        (GroupTag::Mobile, Language::EN) => "Mobile payment methods",
        (GroupTag::Bank, Language::FI) => "Pankkimaksutavat",
        (GroupTag::Bank, Language::SV) => "Bankbetalningsmetoder",
        (GroupTag::Bank, Language::EN) => "Bank payment methods",
        (GroupTag::CreditCard, Language::FI) => "Korttimaksutavat",
        (GroupTag::CreditCard, Language::SV) => "Kortbetalningsmetoder",
        (GroupTag::CreditCard, Language::EN) => "Card payment methods",
        (GroupTag::Credit, Language::FI) => "Lasku- ja osamaksutavat",
        (GroupTag::Credit, Language::SV) => "Faktura- och delbetalningsmetoder",
        (GroupTag::Credit, Language::EN) => "Invoice and instalment payment methods",
        (GroupTag::Other(raw), _) => raw.as_str(),
    };
    label.to_string()
}

/// Raw provider id with its first letter upper-cased.
///
/// Only a display approximation for when the provider list is unavailable.
pub fn capitalize(id: &str) -> String {
    let mut chars = id.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Provider lookups against the PSP
#[derive(Clone)]
pub struct ProviderCatalog {
    psp: Arc<dyn PspClient>,
}

impl ProviderCatalog {
    pub fn new(psp: Arc<dyn PspClient>) -> Self {
        Self { psp }
    }

    /// Providers for `amount` minor units, grouped for display.
    ///
    /// With a subscription in the cart only card providers are listed,
    /// since renewals need a storable card.
    pub async fn list_providers(&self, amount: i64, locale: &str, subscription: bool) -> Catalog {
        let filter: &[GroupTag] = if subscription {
            &[GroupTag::CreditCard]
        } else {
            &[]
        };
        let language = Language::from_locale(locale);

        match self.psp.get_providers(amount, filter).await {
            Ok(providers) => Catalog::Available {
                groups: group_providers(providers, language),
            },
            Err(err) => {
                kassa_log::error!("Could not load payment providers: {}", err);
                Catalog::Unavailable {
                    error: "Payment methods are not available at the moment. Please try again later."
                        .to_string(),
                }
            }
        }
    }

    /// Display name of the provider with `id`, falling back to the
    /// capitalized id when the list cannot be fetched or lacks it.
    pub async fn provider_name(&self, amount: i64, id: &str) -> String {
        match self.psp.get_providers(amount, &[]).await {
            Ok(providers) => providers
                .into_iter()
                .find(|p| p.id == id)
                .map(|p| p.name)
                .unwrap_or_else(|| capitalize(id)),
            Err(err) => {
                kassa_log::warn!("Provider list unavailable, naming '{}' by id: {}", id, err);
                capitalize(id)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider(id: &str, group: &str) -> Provider {
        Provider {
            id: id.into(),
            name: id.to_uppercase(),
            group: group.into(),
            icon: String::new(),
            svg: String::new(),
            url: format!("https://pay.example/{}", id),
            parameters: vec![],
        }
    }

    #[test]
    fn test_grouping_preserves_order() {
        let groups = group_providers(
            vec![
                provider("nordea", "bank"),
                provider("mobilepay", "mobile"),
                provider("op", "bank"),
                provider("walley", "credit"),
                provider("pivo", "mobile"),
            ],
            Language::EN,
        );

        let tags: Vec<&str> = groups.iter().map(|g| g.tag.as_str()).collect();
        assert_eq!(tags, ["bank", "mobile", "credit"]);
        let banks: Vec<&str> = groups[0].providers.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(banks, ["nordea", "op"]);
        assert_eq!(groups[1].label, "Mobile payment methods");
    }

    #[test]
    fn test_unknown_group_uses_raw_tag() {
        let groups = group_providers(vec![provider("coin", "crypto")], Language::FI);
        assert_eq!(groups[0].label, "crypto");
    }

    #[test]
    fn test_localized_labels() {
        assert_eq!(group_label(&GroupTag::Bank, Language::FI), "Pankkimaksutavat");
        assert_eq!(
            group_label(&GroupTag::CreditCard, Language::SV),
            "Kortbetalningsmetoder"
        );
    }

    #[test]
    fn test_capitalize() {
        assert_eq!(capitalize("nordea"), "Nordea");
        assert_eq!(capitalize("ålandsbanken"), "Ålandsbanken");
        assert_eq!(capitalize(""), "");
    }

    #[test]
    fn test_catalog_lookup() {
        let catalog = Catalog::Available {
            groups: group_providers(vec![provider("op", "bank")], Language::EN),
        };
        assert!(catalog.provider("op").is_some());
        assert!(catalog.provider("nordea").is_none());
        let unavailable = Catalog::Unavailable {
            error: "down".into(),
        };
        assert!(unavailable.groups().is_empty());
    }
}
