// CHALLENGE NAMES
pub const ECO_WARRIOR: &str = "Eco-Warrior";
pub const GREEN_THUMB: &str = "Green Thumb";
pub const CARBON_CUTTER: &str = "Carbon Cutter";
pub const WATER_SAVER: &str = "Water Saver";
pub const PLASTIC_BUSTER: &str = "Plastic Buster";
pub const ENERGY_GUARDIAN: &str = "Energy Guardian";
pub const SUSTAINABLE_CHEF: &str = "Sustainable Chef";
pub const ECO_INFLUENCER: &str = "Eco-Influencer";
pub const ETHICAL_SHOPPER: &str = "Ethical Shopper";
pub const PLANET_PROTECTOR: &str = "Planet Protector";
pub const ZERO_WASTE_WEEK: &str = "Zero-Waste Week";
pub const PLANT_A_TREE_DAY: &str = "Plant-a-Tree Day";

/// `(id, name, goal, unit)`; mirrors the rows seeded by `migrations/0001_environ.sql`.
pub const DEFAULT_CHALLENGES: [(i64, &str, f64, &str); 12] = [
    (1, ECO_WARRIOR, 5.0, "kg recycled"),
    (2, GREEN_THUMB, 10.0, "plants"),
    (3, CARBON_CUTTER, 20.0, "car-free trips"),
    (4, WATER_SAVER, 30.0, "short showers"),
    (5, PLASTIC_BUSTER, 25.0, "items avoided"),
    (6, ENERGY_GUARDIAN, 30.0, "days"),
    (7, SUSTAINABLE_CHEF, 15.0, "plant-based meals"),
    (8, ECO_INFLUENCER, 3.0, "friends"),
    (9, ETHICAL_SHOPPER, 10.0, "purchases"),
    (10, PLANET_PROTECTOR, 1.0, "final pledge"),
    (11, ZERO_WASTE_WEEK, 7.0, "days"),
    (12, PLANT_A_TREE_DAY, 100.0, "trees"),
];

// BADGES NOT TIED TO A CHALLENGE
pub const BADGE_TREE_PLANTER: &str = "Tree Planter";
pub const BADGE_RECYCLER_PRO: &str = "Recycler Pro";
pub const BADGE_CLIMATE_CHAMPION: &str = "Climate Champion";
pub const BADGE_LIFESTYLE_CHANGER: &str = "Lifestyle Changer";
pub const BADGE_COMMUNITY_STAR: &str = "Community Star";
pub const BADGE_ECO_LEARNER: &str = "Eco Learner";

// POINTS
pub const COMPLETION_POINTS: i64 = 10;
pub const RECYCLABLE_POINTS: i64 = 20;
pub const NON_RECYCLABLE_POINTS: i64 = 5;
pub const POINTS_PER_LEVEL: i64 = 100;

// MANUAL PROGRESS
pub const MANUAL_STEP: f64 = 1.0;
pub const WATER_SAVER_STEP: f64 = 10.0;

// THRESHOLDS
pub const RECYCLABLE_WEIGHT: f64 = 0.1;
pub const RECYCLER_PRO_ITEMS: i64 = 10;
/// kg of CO2 saved per recyclable item
pub const CO2_PER_ITEM: f64 = 0.2;
pub const CLIMATE_CHAMPION_CO2: f64 = 5.0;
pub const INFLUENCER_MIN_COMPLETED: usize = 3;
pub const LIFESTYLE_CHANGER_COMPLETED: usize = 3;
pub const COMMUNITY_STAR_POSTS: i64 = 5;
pub const ECO_LEARNER_EXCHANGES: u32 = 3;

// LEVEL GATES
pub const COMMUNITY_CHALLENGES_LEVEL: i32 = 3;
pub const LIFESTYLE_QUESTIONNAIRE_LEVEL: i32 = 4;
pub const ANALYTICS_LEVEL: i32 = 5;

pub const LEADERBOARD_SIZE: usize = 5;
pub const FEED_PAGE_SIZE: i64 = 20;
