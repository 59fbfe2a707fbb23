use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString};
use utoipa::ToSchema;

/// Menu sections, in the order the menu page lists them
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, EnumIter,
    ToSchema,
)]
pub enum MenuCategory {
    #[serde(rename = "Appetizers Veg")]
    #[strum(serialize = "Appetizers Veg")]
    AppetizersVeg,
    #[serde(rename = "Appetizers Non-Veg")]
    #[strum(serialize = "Appetizers Non-Veg")]
    AppetizersNonVeg,
    #[serde(rename = "Entrees Veg")]
    #[strum(serialize = "Entrees Veg")]
    EntreesVeg,
    #[serde(rename = "Entrees Chicken")]
    #[strum(serialize = "Entrees Chicken")]
    EntreesChicken,
    #[serde(rename = "Breads")]
    #[strum(serialize = "Breads")]
    Breads,
    #[serde(rename = "Drinks")]
    #[strum(serialize = "Drinks")]
    Drinks,
}

/// A purchasable dish. Prices are integer cents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct MenuItem {
    pub id: String,
    pub name: String,
    pub description: String,
    pub price_cents: i64,
    pub category: MenuCategory,
    #[serde(default)]
    pub vegetarian: bool,
    #[serde(default)]
    pub spicy: bool,
    #[serde(default)]
    pub featured: bool,
    pub image: String,
}

impl MenuItem {
    pub fn new(
        id: &str,
        name: &str,
        description: &str,
        price_cents: i64,
        category: MenuCategory,
    ) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            description: description.to_string(),
            price_cents,
            category,
            vegetarian: false,
            spicy: false,
            featured: false,
            image: "/images/placeholder.svg".to_string(),
        }
    }

    pub fn vegetarian(mut self) -> Self {
        self.vegetarian = true;
        self
    }

    pub fn spicy(mut self) -> Self {
        self.spicy = true;
        self
    }

    pub fn featured(mut self) -> Self {
        self.featured = true;
        self
    }

    pub fn with_image(mut self, image: &str) -> Self {
        self.image = image.to_string();
        self
    }
}

/// The house menu.
pub fn haveli_menu() -> Vec<MenuItem> {
    use MenuCategory::*;

    vec![
        MenuItem::new(
            "veg-samosa",
            "Samosa",
            "Crispy pastry stuffed with spiced potatoes and peas.",
            399,
            AppetizersVeg,
        )
        .vegetarian()
        .featured()
        .with_image("/images/samosa.jpg"),
        MenuItem::new(
            "paneer-tikka",
            "Paneer Tikka",
            "Marinated cottage cheese grilled to perfection.",
            1299,
            AppetizersVeg,
        )
        .vegetarian()
        .featured()
        .with_image("/images/paneertikka.jpg"),
        MenuItem::new(
            "chicken-tikka",
            "Chicken Tikka",
            "Boneless chicken, yogurt marinade, charred edges.",
            1499,
            AppetizersNonVeg,
        )
        .spicy(),
        MenuItem::new(
            "butter-chicken",
            "Butter Chicken",
            "Creamy tomato sauce, tender chicken, fenugreek.",
            1699,
            EntreesChicken,
        )
        .featured(),
        MenuItem::new(
            "biryani",
            "Chicken Biryani",
            "Basmati rice layered with saffron, mint and slow-cooked chicken.",
            1899,
            EntreesChicken,
        )
        .spicy(),
        MenuItem::new(
            "chana-masala",
            "Chana Masala",
            "Chickpeas in a tangy, spiced gravy.",
            1299,
            EntreesVeg,
        )
        .vegetarian()
        .spicy(),
        MenuItem::new(
            "naan",
            "Butter Naan",
            "Soft tandoor-baked leavened bread.",
            399,
            Breads,
        ),
        MenuItem::new(
            "mango-lassi",
            "Mango Lassi",
            "Sweet mango yogurt smoothie.",
            499,
            Drinks,
        )
        .vegetarian(),
    ]
}
