use crate::{
    error::{AppError, AppResult},
    models::{mystery_box, product, MysteryBox, MysteryBoxModel, Product, ProductModel},
};
use sea_orm::{
    prelude::Expr, sea_query::Order as SortOrder, ActiveModelTrait, ColumnTrait,
    DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, QuerySelect,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use utoipa::ToSchema;

const LARGE_SIZE_MULTIPLIER: f64 = 1.4;
const SMALL_SAMPLE: u64 = 5;
const LARGE_SAMPLE: u64 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum BoxSize {
    Small,
    Large,
}

impl BoxSize {
    /// Anything other than `large` (any case) is the regular size.
    pub fn parse(raw: Option<&str>) -> Self {
        match raw {
            Some(s) if s.trim().eq_ignore_ascii_case("large") => BoxSize::Large,
            _ => BoxSize::Small,
        }
    }

    pub fn sample_size(self) -> u64 {
        match self {
            BoxSize::Large => LARGE_SAMPLE,
            BoxSize::Small => SMALL_SAMPLE,
        }
    }

    fn multiplier(self) -> f64 {
        match self {
            BoxSize::Large => LARGE_SIZE_MULTIPLIER,
            BoxSize::Small => 1.0,
        }
    }
}

/// Sized price with the box discount (percent) applied, rounded to a whole unit.
pub fn final_price(base: f64, discount: f64, size: BoxSize) -> i64 {
    let sized = base * size.multiplier();
    let discounted = if discount != 0.0 {
        sized * (1.0 - discount / 100.0)
    } else {
        sized
    };
    discounted.round() as i64
}

#[derive(Debug, Clone)]
pub struct BoxSample {
    pub mystery_box: MysteryBoxModel,
    pub items: Vec<ProductModel>,
    pub final_price: i64,
    pub size: BoxSize,
}

/// Something an order line can point at.
#[derive(Debug, Clone, PartialEq)]
pub enum CatalogItem {
    Product(ProductModel),
    Box(MysteryBoxModel),
}

impl CatalogItem {
    pub fn id(&self) -> i32 {
        match self {
            CatalogItem::Product(p) => p.id,
            CatalogItem::Box(b) => b.id,
        }
    }

    pub fn title(&self) -> &str {
        match self {
            CatalogItem::Product(p) => &p.title,
            CatalogItem::Box(b) => &b.name,
        }
    }

    pub fn price(&self) -> f64 {
        match self {
            CatalogItem::Product(p) => p.price,
            CatalogItem::Box(b) => b.price,
        }
    }

    pub fn category(&self) -> Option<&str> {
        match self {
            CatalogItem::Product(p) => p.category.as_deref(),
            CatalogItem::Box(b) => b.category.as_deref(),
        }
    }

    pub fn image_url(&self) -> Option<&str> {
        match self {
            CatalogItem::Product(p) => p.image_url.as_deref(),
            CatalogItem::Box(b) => b.image_url.as_deref(),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            CatalogItem::Product(_) => "product",
            CatalogItem::Box(_) => "box",
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct BoxInput {
    pub name: Option<String>,
    pub description: Option<String>,
    pub category: Option<String>,
    pub rarity: Option<String>,
    pub discount: Option<f64>,
    pub in_stock: Option<bool>,
    pub price: Option<f64>,
    pub image_url: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ProductInput {
    pub title: String,
    pub price: f64,
    pub image_url: Option<String>,
    pub description: Option<String>,
    pub category: Option<String>,
    pub stock: i32,
}

pub struct CatalogService {
    db: DatabaseConnection,
}

impl CatalogService {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    pub async fn list_boxes(&self) -> AppResult<Vec<MysteryBoxModel>> {
        let boxes = MysteryBox::find()
            .order_by_asc(mystery_box::Column::Id)
            .all(&self.db)
            .await?;
        Ok(boxes)
    }

    pub async fn get_box(&self, id: i32) -> AppResult<MysteryBoxModel> {
        MysteryBox::find_by_id(id)
            .one(&self.db)
            .await?
            .ok_or(AppError::NotFound("Box"))
    }

    /// Draw a random selection of same-category products for a box.
    pub async fn sample_box(&self, id: i32, size: BoxSize) -> AppResult<BoxSample> {
        let mystery_box = self.get_box(id).await?;

        let items = match &mystery_box.category {
            Some(category) => {
                Product::find()
                    .filter(product::Column::Category.eq(category.as_str()))
                    .order_by(Expr::cust("RANDOM()"), SortOrder::Asc)
                    .limit(size.sample_size())
                    .all(&self.db)
                    .await?
            }
            None => Vec::new(),
        };

        let final_price = final_price(mystery_box.price, mystery_box.discount, size);

        Ok(BoxSample {
            mystery_box,
            items,
            final_price,
            size,
        })
    }

    pub async fn create_box(&self, input: BoxInput) -> AppResult<MysteryBoxModel> {
        let name = input
            .name
            .filter(|n| !n.trim().is_empty())
            .ok_or_else(|| AppError::Validation("name is required".to_string()))?;
        let price = input
            .price
            .ok_or_else(|| AppError::Validation("price is required".to_string()))?;
        let discount = input.discount.unwrap_or(0.0);
        validate_price(price)?;
        validate_discount(discount)?;

        let now = chrono::Utc::now().naive_utc();
        let new_box = mystery_box::ActiveModel {
            name: sea_orm::ActiveValue::Set(name),
            description: sea_orm::ActiveValue::Set(input.description),
            category: sea_orm::ActiveValue::Set(input.category),
            rarity: sea_orm::ActiveValue::Set(input.rarity),
            discount: sea_orm::ActiveValue::Set(discount),
            in_stock: sea_orm::ActiveValue::Set(input.in_stock.unwrap_or(true)),
            price: sea_orm::ActiveValue::Set(price),
            image_url: sea_orm::ActiveValue::Set(input.image_url),
            created_at: sea_orm::ActiveValue::Set(now),
            updated_at: sea_orm::ActiveValue::Set(now),
            ..Default::default()
        };

        Ok(new_box.insert(&self.db).await?)
    }

    /// Only the fields present in `patch` change.
    pub async fn update_box(&self, id: i32, patch: BoxInput) -> AppResult<MysteryBoxModel> {
        let existing = self.get_box(id).await?;
        let mut active: mystery_box::ActiveModel = existing.into();

        if let Some(name) = patch.name {
            if name.trim().is_empty() {
                return Err(AppError::Validation("name cannot be empty".to_string()));
            }
            active.name = sea_orm::ActiveValue::Set(name);
        }
        if let Some(description) = patch.description {
            active.description = sea_orm::ActiveValue::Set(Some(description));
        }
        if let Some(category) = patch.category {
            active.category = sea_orm::ActiveValue::Set(Some(category));
        }
        if let Some(rarity) = patch.rarity {
            active.rarity = sea_orm::ActiveValue::Set(Some(rarity));
        }
        if let Some(discount) = patch.discount {
            validate_discount(discount)?;
            active.discount = sea_orm::ActiveValue::Set(discount);
        }
        if let Some(in_stock) = patch.in_stock {
            active.in_stock = sea_orm::ActiveValue::Set(in_stock);
        }
        if let Some(price) = patch.price {
            validate_price(price)?;
            active.price = sea_orm::ActiveValue::Set(price);
        }
        if let Some(image_url) = patch.image_url {
            active.image_url = sea_orm::ActiveValue::Set(Some(image_url));
        }
        active.updated_at = sea_orm::ActiveValue::Set(chrono::Utc::now().naive_utc());

        Ok(active.update(&self.db).await?)
    }

    pub async fn delete_box(&self, id: i32) -> AppResult<()> {
        let result = MysteryBox::delete_by_id(id).exec(&self.db).await?;
        if result.rows_affected == 0 {
            return Err(AppError::NotFound("Box"));
        }
        Ok(())
    }

    pub async fn list_products(&self, category: Option<&str>) -> AppResult<Vec<ProductModel>> {
        let mut query = Product::find().order_by_asc(product::Column::Id);
        if let Some(category) = category {
            query = query.filter(product::Column::Category.eq(category));
        }
        Ok(query.all(&self.db).await?)
    }

    pub async fn create_product(&self, input: ProductInput) -> AppResult<ProductModel> {
        if input.title.trim().is_empty() {
            return Err(AppError::Validation("title is required".to_string()));
        }
        validate_price(input.price)?;

        let new_product = product::ActiveModel {
            title: sea_orm::ActiveValue::Set(input.title),
            price: sea_orm::ActiveValue::Set(input.price),
            image_url: sea_orm::ActiveValue::Set(input.image_url),
            description: sea_orm::ActiveValue::Set(input.description),
            category: sea_orm::ActiveValue::Set(input.category),
            stock: sea_orm::ActiveValue::Set(input.stock.max(0)),
            ..Default::default()
        };

        Ok(new_product.insert(&self.db).await?)
    }

    /// Resolve ids to catalog entries: products first, then boxes for the ids
    /// no product claimed. Unknown ids are simply absent from the map.
    pub async fn resolve_items(&self, ids: &[i32]) -> AppResult<HashMap<i32, CatalogItem>> {
        let mut resolved = HashMap::new();
        if ids.is_empty() {
            return Ok(resolved);
        }

        let products = Product::find()
            .filter(product::Column::Id.is_in(ids.iter().copied()))
            .all(&self.db)
            .await?;
        for p in products {
            resolved.insert(p.id, CatalogItem::Product(p));
        }

        let missing: Vec<i32> = ids
            .iter()
            .copied()
            .filter(|id| !resolved.contains_key(id))
            .collect();
        if !missing.is_empty() {
            let boxes = MysteryBox::find()
                .filter(mystery_box::Column::Id.is_in(missing))
                .all(&self.db)
                .await?;
            for b in boxes {
                resolved.insert(b.id, CatalogItem::Box(b));
            }
        }

        Ok(resolved)
    }
}

fn validate_price(price: f64) -> AppResult<()> {
    if !price.is_finite() || price < 0.0 {
        return Err(AppError::Validation(
            "price must be a non-negative number".to_string(),
        ));
    }
    Ok(())
}

fn validate_discount(discount: f64) -> AppResult<()> {
    if !(0.0..=100.0).contains(&discount) {
        return Err(AppError::Validation(
            "discount must be between 0 and 100".to_string(),
        ));
    }
    Ok(())
}
