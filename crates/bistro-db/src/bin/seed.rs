//! # Demo Data Generator
//!
//! Fills an empty Bistro database with a small restaurant: a menu split
//! into categories, a floor of tables and the default settings.
//!
//! ## Usage
//! ```bash
//! cargo run -p bistro-db --bin seed
//! cargo run -p bistro-db --bin seed -- --db ./data/bistro.db --tables 16
//! ```
//!
//! Users are not created here; run `bistro-pos create-admin` for the first
//! account so the password is hashed by the application.

use std::env;

use bistro_core::{new_id, Actor, Product};
use bistro_db::{Database, DbConfig};
use chrono::Utc;

/// Menu sections with their dishes and prices in cents.
const MENU: &[(&str, &[(&str, &str, i64)])] = &[
    (
        "Starters",
        &[
            ("Tomato Soup", "Roasted tomatoes, basil oil", 650),
            ("Bruschetta", "Grilled bread, tomato, garlic", 720),
            ("Garlic Bread", "With parsley butter", 450),
            ("Caesar Salad", "Romaine, parmesan, croutons", 890),
            ("Calamari", "Fried squid, lemon aioli", 1050),
        ],
    ),
    (
        "Mains",
        &[
            ("Margherita Pizza", "Tomato, mozzarella, basil", 1190),
            ("Beef Burger", "Cheddar, pickles, fries", 1450),
            ("Grilled Salmon", "Seasonal vegetables", 1890),
            ("Mushroom Risotto", "Porcini, parmesan", 1390),
            ("Steak Frites", "Sirloin, pepper sauce", 2350),
            ("Chicken Curry", "Basmati rice, naan", 1520),
        ],
    ),
    (
        "Desserts",
        &[
            ("Tiramisu", "Mascarpone, espresso", 690),
            ("Chocolate Fondant", "Vanilla ice cream", 750),
            ("Cheesecake", "Berry compote", 680),
        ],
    ),
    (
        "Drinks",
        &[
            ("Espresso", "Single shot", 250),
            ("Cappuccino", "Whole or oat milk", 350),
            ("Lemonade", "House made", 390),
            ("Sparkling Water", "0.5 l", 300),
            ("House Red", "Glass, 175 ml", 650),
            ("Draft Beer", "Pint", 590),
        ],
    ),
];

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = env::args().collect();

    let mut db_path = String::from("./bistro.db");
    let mut tables: usize = 10;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--db" | "-d" => {
                if i + 1 < args.len() {
                    db_path = args[i + 1].clone();
                    i += 1;
                }
            }
            "--tables" | "-t" => {
                if i + 1 < args.len() {
                    tables = args[i + 1].parse().unwrap_or(10);
                    i += 1;
                }
            }
            "--help" | "-h" => {
                println!("Bistro POS Demo Data");
                println!();
                println!("Usage: seed [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -d, --db <PATH>      Database file path (default: ./bistro.db)");
                println!("  -t, --tables <N>     Number of tables to create (default: 10)");
                println!("  -h, --help           Show this help message");
                return Ok(());
            }
            _ => {}
        }
        i += 1;
    }

    println!("Bistro POS Demo Data");
    println!("====================");
    println!("Database: {}", db_path);
    println!();

    let db = Database::new(DbConfig::new(&db_path)).await?;
    println!("✓ Connected to database");
    println!("✓ Migrations applied");

    let existing = db.products().list(None).await?;
    if !existing.is_empty() {
        println!("⚠ Database already has {} products", existing.len());
        println!("  Skipping seed to avoid duplicates.");
        return Ok(());
    }

    let start = std::time::Instant::now();
    let mut uow = db.begin(Actor::system()).await?;

    let mut product_count = 0;
    for (position, (section, dishes)) in MENU.iter().enumerate() {
        let category = db
            .categories()
            .create(&mut uow, section, None, position as i64)
            .await?;

        for (name, description, price_cents) in dishes.iter() {
            let now = Utc::now();
            let product = Product {
                id: new_id(),
                category_id: Some(category.id.clone()),
                name: name.to_string(),
                description: Some(description.to_string()),
                price_cents: *price_cents,
                is_available: true,
                is_deleted: false,
                created_at: now,
                updated_at: now,
            };
            db.products().insert(&mut uow, &product).await?;
            product_count += 1;
        }
        println!("  {}: {} items", section, dishes.len());
    }

    for n in 1..=tables {
        let seats = if n % 3 == 0 { 6 } else { 4 };
        db.tables().create(&mut uow, &format!("T{}", n), seats).await?;
    }
    println!("  Tables: {}", tables);

    let audited = uow.commit().await?;

    println!();
    println!(
        "✓ Seeded {} products and {} tables in {:?} ({} audit rows)",
        product_count,
        tables,
        start.elapsed(),
        audited
    );

    let hits = db.products().search("piz", 10).await?;
    println!("  Search 'piz': {} results", hits.len());

    println!();
    println!("✓ Seed complete!");
    Ok(())
}
