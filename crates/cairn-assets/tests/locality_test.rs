// Copyright 2025 eraflo
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Integration tests for global/local routing and locality enforcement.

mod common;

use cairn_assets::AssetRouter;
use cairn_core::{AssetError, AssetState, LoadPriority};
use common::{pump, pump_until, Adopter, Fixture, Level, Popup, Text};

#[test]
fn test_router_sends_each_kind_to_its_registry() {
    let fx = Fixture::new();
    let level_counters = fx.level.clone();
    let router = AssetRouter::new(fx.registry);

    let text = router.load::<Text>("a.txt".into(), LoadPriority::Synchronous).unwrap();
    let level = router.load::<Level>("castle".into(), LoadPriority::High).unwrap();
    pump_until(|| router.apply_assets(), || level.is_loaded());

    assert!(router.global().state(text.id()).is_some());
    assert!(router.local().state(text.id()).is_none());
    assert!(router.local().state(level.id()).is_some());
    assert!(router.global().state(level.id()).is_none());
    assert_eq!(*level.get().unwrap(), "CASTLE");
    assert_eq!(level_counters.loads(), 1);

    // The level's title went to the global registry.
    assert_eq!(router.global().len(), 2);
    assert_eq!(router.stats().len(), 3);
}

#[test]
fn test_global_registry_refuses_context_kinds() {
    let fx = Fixture::new();
    let err = fx.registry.load::<Level>("castle".into(), LoadPriority::High).unwrap_err();
    assert!(matches!(err, AssetError::WrongLocalityUse(_)));
    assert!(err.is_contract_violation());

    let err = fx.registry.load::<Popup>("hi".into(), LoadPriority::High).unwrap_err();
    assert!(matches!(err, AssetError::WrongLocalityUse(_)));
}

#[test]
fn test_global_kinds_loaded_through_a_local_registry_land_in_the_global_one() {
    let fx = Fixture::new();
    let local = fx.registry.new_local();
    let handle = local.load::<Text>("b.txt".into(), LoadPriority::Synchronous).unwrap();

    assert!(local.is_empty());
    assert_eq!(fx.registry.state(handle.id()), Some(AssetState::Loaded));
    assert!(!local.is_global());
}

#[test]
fn test_local_registry_refuses_foreign_local_handles() {
    let fx = Fixture::new();
    let a = fx.registry.new_local();
    let b = fx.registry.new_local();

    let mut level = a.load::<Level>("intro".into(), LoadPriority::Synchronous).unwrap();
    let err = b.unload(&mut level).unwrap_err();
    assert!(matches!(err, AssetError::WrongLocalityUse(_)));
    assert!(level.is_valid(), "a refused unload leaves the handle alone");

    let err = fx.registry.unload(&mut level).unwrap_err();
    assert!(matches!(err, AssetError::WrongLocalityUse(_)));

    a.unload(&mut level).unwrap();
    assert!(!level.is_valid());
}

#[test]
fn test_local_registry_accepts_global_handles() {
    let fx = Fixture::new();
    let local = fx.registry.new_local();
    let mut text = fx.registry.load::<Text>("a.txt".into(), LoadPriority::Synchronous).unwrap();
    local.unload(&mut text).unwrap();
    assert_eq!(fx.text.unloads(), 1);
}

#[test]
fn test_global_asset_cannot_adopt_a_local_secondary() {
    let fx = Fixture::new();
    let local = fx.registry.new_local();
    let level = local.load::<Level>("intro".into(), LoadPriority::Synchronous).unwrap();
    fx.park_for_adopter(level.clone().untyped());

    let adopter = fx.registry.load::<Adopter>("x".into(), LoadPriority::High).unwrap();
    pump(&fx.registry, || adopter.state().is_settled());

    assert_eq!(adopter.state(), AssetState::Error);
    assert!(matches!(adopter.get(), Err(AssetError::WrongLocalityUse(_))));
    // The refused handle was released; only the test's reference is left.
    pump_until(|| local.apply_assets(), || level.is_loaded());
    assert_eq!(local.stats()[0].ref_count, 1);
}

#[test]
fn test_single_usage_kinds_never_share() {
    let fx = Fixture::new();
    let popups = fx.popup.clone();
    let router = AssetRouter::new(fx.registry);

    let a = router.load::<Popup>("saved".into(), LoadPriority::Synchronous).unwrap();
    let b = router.load::<Popup>("saved".into(), LoadPriority::Synchronous).unwrap();

    assert_ne!(a.id(), b.id());
    assert_eq!(router.local().len(), 2);
    assert_eq!(popups.loads(), 2);
}

#[test]
fn test_reset_local_disposes_context_assets_and_their_global_references() {
    let fx = Fixture::new();
    let levels = fx.level.clone();
    let texts = fx.text.clone();
    let mut router = AssetRouter::new(fx.registry);

    let level = router.load::<Level>("castle".into(), LoadPriority::High).unwrap();
    pump_until(|| router.apply_assets(), || level.is_loaded());
    let title = router.load::<Text>("castle.title".into(), LoadPriority::High).unwrap();

    router.reset_local();
    router.apply_assets().unwrap();

    assert_eq!(levels.unloads(), 1, "context assets die with their registry");
    assert_eq!(level.state(), AssetState::Disposed);
    assert!(title.is_loaded(), "the test still holds the title");
    assert_eq!(texts.unloads(), 0);
    assert!(router.local().is_empty());
    assert_eq!(router.global().stats()[0].ref_count, 1);
}
