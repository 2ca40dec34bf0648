//! End-to-end scenario tests for rts_kernel.
//!
//! These drive whole scenarios frame by frame through the public API and
//! check the outcomes a player would observe.

use rts_kernel::prelude::*;
use rts_test_utils::fixtures::{duel_map_records, duel_scenario, empty_scenario, player, pos};

// =============================================================================
// Combat
// =============================================================================

mod combat {
    use super::*;

    /// Marines shoot air, the wraith's lasers shoot ground; the wraith wins.
    #[test]
    fn test_wraith_outlasts_lone_marine() {
        let mut scenario = empty_scenario(32, 32, 1);
        let marine = scenario.spawn("Marine", Some(player(0)), pos(60, 40)).unwrap();
        let wraith = scenario.spawn("Wraith", Some(player(1)), pos(72, 40)).unwrap();

        for _ in 0..200 {
            scenario.update();
        }

        assert!(scenario.element(marine).is_none(), "marine should have fallen");
        let hp = scenario.entity(wraith).unwrap().armour().hp();
        assert!(hp < Fixed::from_num(120), "marine never landed a shot");
        assert!(hp >= Fixed::from_num(60), "wraith took {hp} damage");
    }

    /// Units of the same owner never acquire each other.
    #[test]
    fn test_allies_hold_fire() {
        let mut scenario = empty_scenario(32, 32, 1);
        scenario.spawn("Marine", Some(player(0)), pos(60, 40)).unwrap();
        scenario.spawn("Vulture", Some(player(0)), pos(70, 40)).unwrap();

        for _ in 0..100 {
            assert!(scenario.update().impacts.is_empty());
        }
    }

    /// An attack command sends the attacker into range of a distant target.
    #[test]
    fn test_attack_command_closes_distance() {
        let mut scenario = empty_scenario(48, 32, 1);
        let marine = scenario.spawn("Marine", Some(player(0)), pos(20, 40)).unwrap();
        let depot = scenario.spawn("SupplyDepot", Some(player(1)), pos(120, 40)).unwrap();

        assert!(scenario.issue_command(
            player(0),
            Command::Attack {
                entity: marine,
                target: depot,
            }
        ));

        let mut hit = false;
        for _ in 0..600 {
            hit |= scenario
                .update()
                .impacts
                .iter()
                .any(|impact| impact.target == depot && impact.attacker == marine);
        }
        assert!(hit, "marine never reached the depot");
        let depot_hp = scenario.entity(depot).unwrap().armour().hp();
        assert!(depot_hp < Fixed::from_num(500));
    }
}

// =============================================================================
// Economy
// =============================================================================

mod economy {
    use super::*;

    /// A full queue rejects further jobs without charging for them.
    #[test]
    fn test_queue_capacity_is_enforced() {
        let mut scenario = empty_scenario(32, 32, 1);
        scenario.add_player(player(0));
        let barracks = scenario.spawn("Barracks", Some(player(0)), pos(60, 20)).unwrap();

        for _ in 0..5 {
            assert!(scenario.start_production(player(0), barracks, "Marine"));
        }
        assert!(!scenario.start_production(player(0), barracks, "Marine"));

        let line = scenario.entity(barracks).unwrap().production().unwrap();
        assert_eq!(line.item_count(), line.capacity());
        assert_eq!(scenario.player(player(0)).unwrap().minerals(), 4750);
    }

    /// A player who cannot afford a unit keeps their balance.
    #[test]
    fn test_unaffordable_unit_charges_nothing() {
        let mut scenario = empty_scenario(32, 32, 1);
        scenario.add_player(player(0));
        let barracks = scenario.spawn("Barracks", Some(player(0)), pos(60, 20)).unwrap();
        assert!(scenario
            .player_mut(player(0))
            .unwrap()
            .take_resources(4980, 0));

        assert!(!scenario.start_production(player(0), barracks, "Marine"));
        assert_eq!(scenario.player(player(0)).unwrap().minerals(), 20);
    }

    /// A factory builds its machine shop beside itself.
    #[test]
    fn test_factory_builds_addon() {
        let mut scenario = empty_scenario(32, 32, 1);
        scenario.add_player(player(0));
        let factory = scenario.spawn("Factory", Some(player(0)), pos(60, 20)).unwrap();

        assert!(scenario.start_production(player(0), factory, "MachineShop"));
        let owner = scenario.player(player(0)).unwrap();
        assert_eq!((owner.minerals(), owner.gas()), (4950, 4950));
        let addon = owner.addons().next().expect("addon admitted at once");
        assert!(scenario.entity(addon).unwrap().is_under_construction());

        let mut completed = Vec::new();
        for _ in 0..600 {
            completed.extend(scenario.update().completed);
        }

        assert_eq!(completed.len(), 1);
        assert_eq!(completed[0].product, "MachineShop");
        assert!(!scenario.entity(addon).unwrap().is_under_construction());
        assert_eq!(scenario.entity(factory).unwrap().addon(), Some(addon));
        assert!(!scenario.start_production(player(0), factory, "MachineShop"));
    }

    /// Cancelling an addon under construction tears it down.
    #[test]
    fn test_cancelled_addon_is_destroyed() {
        let mut scenario = empty_scenario(32, 32, 1);
        scenario.add_player(player(0));
        let factory = scenario.spawn("Factory", Some(player(0)), pos(60, 20)).unwrap();
        assert!(scenario.start_production(player(0), factory, "MachineShop"));
        let addon = scenario.player(player(0)).unwrap().addons().next().unwrap();

        for _ in 0..100 {
            scenario.update();
        }
        assert!(scenario.cancel_production(player(0), factory, 0));
        scenario.update();

        assert!(scenario.element(addon).is_none());
        assert_eq!(scenario.player(player(0)).unwrap().addons().count(), 0);
        assert!(scenario.entity(factory).unwrap().addon().is_none());
    }

    /// Research finishes into an upgrade element that raises the level.
    #[test]
    fn test_engineering_bay_researches_weapons() {
        let mut scenario = empty_scenario(32, 32, 1);
        scenario.add_player(player(0));
        let bay = scenario.spawn("EngineeringBay", Some(player(0)), pos(60, 20)).unwrap();

        assert!(scenario.start_production(player(0), bay, "InfantryWeapons"));
        assert_eq!(scenario.upgrade_level(player(0), "InfantryWeapons"), 0);

        for _ in 0..4001 {
            scenario.update();
        }

        assert_eq!(scenario.upgrade_level(player(0), "InfantryWeapons"), 1);
        assert_eq!(scenario.upgrade_bonus(Some(player(0)), Some("InfantryWeapons")), 1);
        assert_eq!(scenario.upgrade_bonus(None, Some("InfantryWeapons")), 0);
    }

    /// Research already queued counts towards the maximum level.
    #[test]
    fn test_queued_research_stops_at_max_level() {
        let mut scenario = empty_scenario(32, 32, 1);
        scenario.add_player(player(0));
        let bay = scenario.spawn("EngineeringBay", Some(player(0)), pos(60, 20)).unwrap();
        let spare = scenario.spawn("EngineeringBay", Some(player(0)), pos(60, 60)).unwrap();

        assert!(scenario.start_production(player(0), bay, "InfantryWeapons"));
        assert!(scenario.start_production(player(0), bay, "InfantryWeapons"));
        assert!(scenario.start_production(player(0), spare, "InfantryWeapons"));
        assert!(!scenario.start_production(player(0), bay, "InfantryWeapons"));
        assert!(!scenario.start_production(player(0), spare, "InfantryWeapons"));

        let owner = scenario.player(player(0)).unwrap();
        assert_eq!((owner.minerals(), owner.gas()), (4700, 4700));

        for _ in 0..10_000 {
            scenario.update();
        }
        assert_eq!(scenario.upgrade_level(player(0), "InfantryWeapons"), 3);
        assert!(!scenario.start_production(player(0), spare, "InfantryWeapons"));
    }
}

// =============================================================================
// Persistence
// =============================================================================

mod persistence {
    use super::*;

    #[test]
    fn test_map_survives_binary_round_trip() {
        let bytes = encode_records(&duel_map_records()).unwrap();
        let decoded = decode_records(&bytes).unwrap();
        assert_eq!(decoded, duel_map_records());

        let scenario = duel_scenario(1);
        let mut actual = scenario.to_records().unwrap();
        let mut expected = duel_map_records();
        expected.sort_by_key(|record| format!("{record:?}"));
        actual.sort_by_key(|record| format!("{record:?}"));
        assert_eq!(actual, expected);
    }

    #[test]
    fn test_bootstrapped_players_own_their_start_locations() {
        let scenario = duel_scenario(1);
        for index in 0..2 {
            let owner = scenario.player(player(index)).unwrap();
            let start = owner.start_location().expect("start location linked");
            assert!(scenario.element(start).is_some());
        }
    }
}
