use anyhow::Result;
use occacia_core::{Package, Vendor};
use tracing::info;

use crate::CatalogRepository;

fn vendor(business_name: &str, location_base: &str, email: &str, phone: &str) -> Vendor {
    Vendor {
        id: 0,
        business_name: business_name.to_string(),
        location_base: location_base.to_string(),
        email: email.to_string(),
        phone: Some(phone.to_string()),
        is_verified: true,
    }
}

fn package(
    name: &str,
    description: &str,
    price: f64,
    guests: (u32, u32),
    location: &str,
    tags: &[&str],
) -> Package {
    Package {
        id: 0,
        vendor_id: 0,
        name: name.to_string(),
        description: Some(description.to_string()),
        price,
        price_per_head: None,
        min_guests: guests.0,
        max_guests: guests.1,
        tags: tags.iter().map(|tag| tag.to_string()).collect(),
        location_coverage: Some(location.to_string()),
    }
}

/// Six vendors with one package each, covering every budget tier.
pub fn demo_catalog() -> Vec<(Vendor, Vec<Package>)> {
    vec![
        (
            vendor("The Colonial Bungalow", "Kandy", "stay@colonial.lk", "+94771234567"),
            vec![package(
                "The Hermit's Dinner",
                "A completely private dining experience in a secluded garden booth.",
                3_500.0,
                (1, 4),
                "Kandy",
                &["private-dining", "quiet", "secluded"],
            )],
        ),
        (
            vendor("TechHub Business Center", "Colombo", "book@techhub.lk", "+94112345678"),
            vec![package(
                "Executive Boardroom",
                "Soundproof boardroom with 5G Wifi and 4K Projector.",
                5_000.0,
                (5, 20),
                "Colombo",
                &["projector", "wifi", "business"],
            )],
        ),
        (
            vendor("Cloud9 Rooftop", "Galle", "love@cloud9.lk", "+94779998888"),
            vec![package(
                "Sunset Proposal Package",
                "Private rooftop corner with rose petals and candles.",
                15_000.0,
                (2, 2),
                "Galle",
                &["romantic", "proposal", "luxury"],
            )],
        ),
        (
            vendor("Burger Shack", "Colombo", "hey@burgershack.lk", "+94775554444"),
            vec![package(
                "Student Birthday Bash",
                "Reserved large table, loud music, and budget platters.",
                1_500.0,
                (10, 30),
                "Colombo",
                &["budget", "party", "loud"],
            )],
        ),
        (
            vendor("Palm Grove Resort", "Bentota", "fam@palmgrove.lk", "+94342223333"),
            vec![package(
                "Family Day Out",
                "Access to kids' pool, buffet lunch, and garden.",
                4_000.0,
                (4, 15),
                "Bentota",
                &["family", "pool", "kids"],
            )],
        ),
        (
            vendor("Wild Trails Camp", "Ella", "wild@trails.lk", "+94711112222"),
            vec![package(
                "Jungle BBQ Night",
                "Camping under the stars with a bonfire BBQ.",
                2_500.0,
                (2, 10),
                "Ella",
                &["nature", "adventure", "camping"],
            )],
        ),
    ]
}

/// Loads [`demo_catalog`] into an empty store. Returns the number of packages inserted.
pub async fn seed_demo_catalog<S: CatalogRepository>(store: &S) -> Result<usize> {
    if store.count_vendors().await? > 0 {
        info!("catalog already populated, skipping seed");
        return Ok(0);
    }

    let mut inserted = 0;
    for (vendor, packages) in demo_catalog() {
        let vendor_id = store.insert_vendor(vendor).await?;
        for mut package in packages {
            package.vendor_id = vendor_id;
            store.insert_package(package).await?;
            inserted += 1;
        }
    }

    info!(packages = inserted, "demo catalog seeded");
    Ok(inserted)
}
