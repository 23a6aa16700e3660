use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::domain::{CategoryId, Partner, PartnerId, Reward, RewardCategory, RewardId};

/// Named class of personal data a partner may request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub id: CategoryId,
    pub label: String,
    pub description: String,
}

/// Static catalog of data categories, fixed at process start.
#[derive(Debug, Clone, Default)]
pub struct CategoryRegistry {
    categories: BTreeMap<CategoryId, Category>,
}

const STANDARD_CATEGORIES: &[(&str, &str)] = &[
    ("Location", "Places you visit and the routes you take"),
    ("Spending Data", "Card and bank transaction summaries"),
    ("Travel Preferences", "Preferred destinations, airlines and seating"),
    ("Booking History", "Past hotel, flight and rental reservations"),
    ("Dining Preferences", "Cuisines, dietary needs and favourite venues"),
    ("Shopping History", "Online and in-store purchase history"),
    ("Health & Fitness", "Activity, sleep and workout summaries"),
    ("Social Media Activity", "Engagement with followed brands and creators"),
];

impl CategoryRegistry {
    pub fn new(categories: impl IntoIterator<Item = Category>) -> Self {
        Self {
            categories: categories
                .into_iter()
                .map(|category| (category.id.clone(), category))
                .collect(),
        }
    }

    pub fn standard() -> Self {
        Self::new(STANDARD_CATEGORIES.iter().map(|(label, description)| Category {
            id: CategoryId::new(*label),
            label: (*label).to_string(),
            description: (*description).to_string(),
        }))
    }

    /// Unknown ids are a caller bug; boundaries check with [`CategoryRegistry::contains`].
    pub fn by_id(&self, id: &CategoryId) -> Option<&Category> {
        self.categories.get(id)
    }

    pub fn contains(&self, id: &CategoryId) -> bool {
        self.categories.contains_key(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Category> {
        self.categories.values()
    }

    pub fn len(&self) -> usize {
        self.categories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.categories.is_empty()
    }
}

fn reward(
    id: &str,
    title: &str,
    description: &str,
    category: RewardCategory,
    value: &str,
    expiry_date: Option<NaiveDate>,
) -> Reward {
    Reward {
        id: RewardId::new(id),
        title: title.to_string(),
        description: description.to_string(),
        category,
        value: value.to_string(),
        expiry_date,
        terms: Some("One voucher per account. Not exchangeable for cash.".to_string()),
    }
}

fn categories(labels: &[&str]) -> Vec<CategoryId> {
    labels.iter().map(|label| CategoryId::new(*label)).collect()
}

/// Partners offered to every new account at bootstrap.
pub fn bootstrap_partners() -> Vec<Partner> {
    vec![
        Partner::offered(
            PartnerId(1),
            "SkyHigh Airways",
            categories(&["Travel Preferences", "Booking History"]),
            reward(
                "r1",
                "$10 flight credit",
                "Credit applied to your next booking",
                RewardCategory::Travel,
                "$10",
                None,
            ),
        ),
        Partner::offered(
            PartnerId(2),
            "TableTaste",
            categories(&["Dining Preferences", "Location"]),
            reward(
                "r2",
                "Free dessert",
                "A dessert on the house at participating restaurants",
                RewardCategory::Dining,
                "$8",
                None,
            ),
        ),
        Partner::offered(
            PartnerId(3),
            "CartWise",
            categories(&["Shopping History", "Spending Data"]),
            reward(
                "r3",
                "15% off your next order",
                "Discount on a single online order",
                RewardCategory::Shopping,
                "15%",
                None,
            ),
        ),
    ]
}

/// Templates the periodic offer source draws from. Ids start above the bootstrap set.
pub fn offer_templates() -> Vec<Partner> {
    vec![
        Partner::offered(
            PartnerId(101),
            "Wanderlust Hotels",
            categories(&["Travel Preferences", "Location"]),
            reward(
                "wanderlust-night",
                "Free room upgrade",
                "Upgrade on your next two-night stay",
                RewardCategory::Travel,
                "$40",
                None,
            ),
        ),
        Partner::offered(
            PartnerId(102),
            "FitFuel",
            categories(&["Health & Fitness", "Dining Preferences"]),
            reward(
                "fitfuel-bowl",
                "Protein bowl voucher",
                "One bowl at any FitFuel counter",
                RewardCategory::Dining,
                "$12",
                None,
            ),
        ),
        Partner::offered(
            PartnerId(103),
            "TrendLoop",
            categories(&["Social Media Activity", "Shopping History"]),
            reward(
                "trendloop-gift",
                "$20 gift card",
                "Spend on anything in the TrendLoop store",
                RewardCategory::Shopping,
                "$20",
                None,
            ),
        ),
    ]
}
