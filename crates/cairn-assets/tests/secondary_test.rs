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

//! Integration tests for secondary (dependency) assets.

mod common;

use cairn_core::{AssetError, AssetState, LoadPriority};
use common::{pump, pump_until, Broken, Bundle, Fixture, Gated, Lazy, Level, Text, Waiter, Watcher};

fn parts(names: &[&str]) -> Vec<String> {
    names.iter().map(|n| n.to_string()).collect()
}

#[test]
fn test_bundle_loads_after_all_parts() {
    let fx = Fixture::new();
    let bundle = fx
        .registry
        .load::<Bundle>(parts(&["a.txt", "b.txt"]), LoadPriority::High)
        .unwrap();

    pump(&fx.registry, || bundle.state().is_settled());
    assert_eq!(bundle.state(), AssetState::Loaded);
    assert_eq!(*bundle.get().unwrap(), 2);

    // Parts are kept alive by the bundle alone.
    let a = fx.identities.id_of::<Text>(&"a.txt".into()).unwrap();
    assert_eq!(fx.registry.state(a), Some(AssetState::Loaded));
    assert_eq!(fx.text.loads(), 2);
}

#[test]
fn test_failed_part_fails_the_bundle_and_releases_the_others() {
    let fx = Fixture::new();
    let bundle = fx
        .registry
        .load::<Bundle>(parts(&["y.txt", "bad.bin"]), LoadPriority::High)
        .unwrap();

    pump(&fx.registry, || bundle.state().is_settled());
    assert_eq!(bundle.state(), AssetState::Error, "no partial success");
    let err = bundle.get().unwrap_err();
    assert!(matches!(err, AssetError::LoadFailure { ref description, .. } if description.contains("bad.bin")));

    // The bundle produced a value before its part failed; it is unloaded.
    pump(&fx.registry, || fx.bundle.unloads() == 1);

    let y = fx.identities.id_of::<Text>(&"y.txt".into()).unwrap();
    let z = fx.identities.id_of::<Broken>(&"bad.bin".into()).unwrap();
    pump(&fx.registry, || {
        fx.registry.state(y).is_none() && fx.registry.state(z).is_none()
    });
    pump(&fx.registry, || fx.text.unloads() == fx.text.loads());
    assert_eq!(fx.broken.loads(), 1);
}

#[test]
fn test_shared_part_survives_its_bundle() {
    let fx = Fixture::new();
    let part = fx.registry.load::<Text>("a.txt".into(), LoadPriority::Synchronous).unwrap();
    let bundle = fx
        .registry
        .load::<Bundle>(parts(&["a.txt"]), LoadPriority::High)
        .unwrap();
    pump(&fx.registry, || bundle.is_loaded());
    assert_eq!(fx.text.loads(), 1, "the part was deduplicated");

    drop(bundle);
    fx.registry.apply_assets().unwrap();
    assert!(part.is_loaded());
    assert_eq!(fx.text.unloads(), 0);
}

#[test]
fn test_non_waiting_kind_is_loaded_before_its_secondaries() {
    let fx = Fixture::new();
    let lazy = fx.registry.load::<Lazy>(11, LoadPriority::High).unwrap();
    pump(&fx.registry, || lazy.is_loaded());

    let gated = fx.identities.id_of::<Gated>(&11).unwrap();
    assert_ne!(fx.registry.state(gated), Some(AssetState::Loaded));

    fx.open_gate();
    pump(&fx.registry, || fx.registry.state(gated) == Some(AssetState::Loaded));
    assert_eq!(fx.lazy.loads(), 1);
}

#[test]
fn test_disposing_while_loading_unloads_the_late_result() {
    let fx = Fixture::new();
    let handle = fx.registry.load::<Gated>(21, LoadPriority::High).unwrap();
    pump(&fx.registry, || fx.gated.loads() == 1);

    drop(handle);
    fx.open_gate();
    pump(&fx.registry, || fx.gated.unloads() == 1);
    pump(&fx.registry, || fx.registry.is_empty());
}

#[test]
fn test_releasing_a_bundle_mid_wait_releases_its_parts() {
    let fx = Fixture::new();
    let bundle = fx
        .registry
        .load::<Bundle>(parts(&["a.txt", "b.txt"]), LoadPriority::High)
        .unwrap();
    drop(bundle);

    pump(&fx.registry, || {
        fx.registry.is_empty() && fx.text.unloads() == fx.text.loads()
    });
    assert!(fx.bundle.unloads() <= 1);
}

#[test]
fn test_load_step_waiting_for_its_parts_sees_them_loaded() {
    let fx = Fixture::new();
    let waiter = fx
        .registry
        .load::<Waiter>(parts(&["a.txt", "c.txt"]), LoadPriority::High)
        .unwrap();

    pump(&fx.registry, || waiter.state().is_settled());
    assert_eq!(waiter.state(), AssetState::Loaded);
    assert_eq!(*waiter.get().unwrap(), 2);
    for part in ["a.txt", "c.txt"] {
        let id = fx.identities.id_of::<Text>(&part.into()).unwrap();
        assert_eq!(fx.registry.state(id), Some(AssetState::Loaded));
    }
}

#[test]
fn test_load_step_waiting_for_a_failed_part_fails_with_its_error() {
    let fx = Fixture::new();
    let waiter = fx
        .registry
        .load::<Waiter>(parts(&["b.txt", "bad.dat"]), LoadPriority::High)
        .unwrap();

    pump(&fx.registry, || waiter.state().is_settled());
    assert_eq!(waiter.state(), AssetState::Error);
    let err = waiter.get().unwrap_err();
    assert!(matches!(err, AssetError::LoadFailure { ref description, .. } if description.contains("bad.dat")));

    let bad = fx.identities.id_of::<Broken>(&"bad.dat".into()).unwrap();
    pump(&fx.registry, || fx.registry.state(bad).is_none());
}

#[test]
fn test_load_step_cannot_wait_on_a_foreign_local_asset() {
    let fx = Fixture::new();
    let a = fx.registry.new_local();
    let b = fx.registry.new_local();

    let foreign = b.load::<Level>("intro".into(), LoadPriority::Synchronous).unwrap();
    fx.park_for_watcher(foreign.clone().untyped());

    let watcher = a.load::<Watcher>("w".into(), LoadPriority::High).unwrap();
    pump_until(|| a.apply_assets(), || watcher.state().is_settled());

    assert_eq!(watcher.state(), AssetState::Error);
    assert!(matches!(watcher.get(), Err(AssetError::WrongLocalityUse(_))));
    // The parked reference was given back; only the test's one is left.
    pump_until(|| b.apply_assets(), || b.stats()[0].ref_count == 1);
    assert!(foreign.state() != AssetState::Disposed);
}
