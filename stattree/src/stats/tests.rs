/*
 * Created on Tue Apr 02 2024
 *
 * This file is a part of Stattree
 * Stattree is a free and open-source in-process telemetry registry written by
 * Sayan Nandan ("the Author") with the vision to expose live statistics
 * sources and metric tables through a simple virtual filesystem surface.
 *
 * Copyright (c) 2024, Sayan Nandan <nandansayan@outlook.com>
 *
 * This program is free software: you can redistribute it and/or modify
 * it under the terms of the GNU Affero General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * This program is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
 * GNU Affero General Public License for more details.
 *
 * You should have received a copy of the GNU Affero General Public License
 * along with this program. If not, see <https://www.gnu.org/licenses/>.
 *
*/

use {
    super::{AggrKind, Source, ValueDesc, ValueFlag, ValueType},
    crate::error::StatError,
    core::mem::offset_of,
    std::sync::Arc,
};

struct Backing {
    u64v: u64,
    s32v: i32,
    boolv: bool,
    u8v: u8,
    s16v: i16,
}

impl Backing {
    fn boxed(u64v: u64, s32v: i32, boolv: bool, u8v: u8, s16v: i16) -> Box<Self> {
        Box::new(Self {
            u64v,
            s32v,
            boolv,
            u8v,
            s16v,
        })
    }
}

fn base_of(b: &mut Box<Backing>) -> *mut u8 {
    (&mut **b as *mut Backing).cast()
}

/// all five fields as simple values
static SIMPLE_VALUES: [ValueDesc; 5] = stat_values! {
    Backing => {
        "u64": u64v as U64, Cumulative, "a 64-bit counter";
        "s32": s32v as S32, Gauge, "a signed gauge";
        "bo": boolv as Bool, Gauge, "a boolean";
        "u8": u8v as U8, Cumulative, "a tiny counter";
        "s16": s16v as S16, Gauge, "a 16-bit gauge";
    }
};

/// the same five fields, each carrying an aggregation kind; children bind
/// this array at their bases, the parent attaches it base-less
static AGGR_VALUES: [ValueDesc; 5] = [
    ValueDesc::new(
        "u64",
        "sum across the subtree",
        offset_of!(Backing, u64v),
        ValueType::U64,
        AggrKind::Sum,
        ValueFlag::Cumulative,
    ),
    ValueDesc::new(
        "s32",
        "minimum across the subtree",
        offset_of!(Backing, s32v),
        ValueType::S32,
        AggrKind::Min,
        ValueFlag::Gauge,
    ),
    ValueDesc::new(
        "bo",
        "zero count across the subtree",
        offset_of!(Backing, boolv),
        ValueType::Bool,
        AggrKind::CountZero,
        ValueFlag::Gauge,
    ),
    ValueDesc::new(
        "u8",
        "average across the subtree",
        offset_of!(Backing, u8v),
        ValueType::U8,
        AggrKind::Avg,
        ValueFlag::Gauge,
    ),
    ValueDesc::new(
        "s16",
        "maximum across the subtree",
        offset_of!(Backing, s16v),
        ValueType::S16,
        AggrKind::Max,
        ValueFlag::Gauge,
    ),
];

/// parent with two bound children: (aggregating parent, child a, child b)
fn sibling_tree(
    a: &mut Box<Backing>,
    b: &mut Box<Backing>,
) -> (Arc<Source>, Arc<Source>, Arc<Source>) {
    let parent = Source::new("parent", "node");
    let child_a = Source::new("a", "node");
    let child_b = Source::new("b", "node");
    unsafe {
        child_a.bind(&AGGR_VALUES, base_of(a)).unwrap();
        child_b.bind(&AGGR_VALUES, base_of(b)).unwrap();
    }
    parent.bind_aggregates(&AGGR_VALUES).unwrap();
    parent.link(&child_a).unwrap();
    parent.link(&child_b).unwrap();
    (parent, child_a, child_b)
}

#[test]
fn simple_reads() {
    let mut backing = Backing::boxed(64, i32::MIN, true, 127, 10000);
    let src = Source::new("node0", "kind");
    unsafe {
        src.bind(&SIMPLE_VALUES, base_of(&mut backing)).unwrap();
    }
    assert_eq!(src.value_by_name("u64").unwrap(), 64);
    assert_eq!(
        src.value_by_name("s32").unwrap() as i64 as i32,
        i32::MIN
    );
    assert_eq!(src.value_by_name("bo").unwrap(), 1);
    assert_eq!(src.value_by_name("u8").unwrap(), 127);
    assert_eq!(src.value_by_name("s16").unwrap(), 10000);
    assert_eq!(
        src.value_by_name("missing").unwrap_err(),
        StatError::NotFound
    );
    // by-descriptor resolution agrees with by-name
    assert_eq!(src.value_of(&SIMPLE_VALUES[0]).unwrap(), 64);
}

#[test]
fn lookup_is_local_to_the_source() {
    let mut backing = Backing::boxed(1, 2, false, 3, 4);
    let parent = Source::new("parent", "node");
    let child = Source::new("child", "node");
    unsafe {
        child.bind(&SIMPLE_VALUES, base_of(&mut backing)).unwrap();
    }
    parent.link(&child).unwrap();
    // the child's names never resolve on the parent
    assert_eq!(
        parent.value_by_name("u64").unwrap_err(),
        StatError::NotFound
    );
    // and a foreign descriptor never resolves either
    assert_eq!(
        parent.value_of(&SIMPLE_VALUES[0]).unwrap_err(),
        StatError::NotFound
    );
}

#[test]
fn sibling_aggregation() {
    let mut a = Backing::boxed(64, i32::MIN, true, 127, 10000);
    let mut b = Backing::boxed(64, 32767, false, 255, -20000);
    let (parent, _a, _b) = sibling_tree(&mut a, &mut b);
    assert_eq!(parent.value_by_name("u64").unwrap(), 128);
    assert_eq!(parent.value_by_name("s32").unwrap() as i64, -2_147_483_648);
    assert_eq!(parent.value_by_name("bo").unwrap(), 1);
    assert_eq!(parent.value_by_name("u8").unwrap(), 191);
    assert_eq!(parent.value_by_name("s16").unwrap() as i64, 10000);
}

#[test]
fn aggregate_on_bound_node_covers_itself() {
    // a node that both owns data and aggregates contributes its own values
    let mut a = Backing::boxed(10, 0, true, 0, 0);
    let mut b = Backing::boxed(32, 0, true, 0, 0);
    let parent = Source::new("parent", "node");
    let child = Source::new("child", "node");
    unsafe {
        parent.bind(&AGGR_VALUES, base_of(&mut a)).unwrap();
        child.bind(&AGGR_VALUES, base_of(&mut b)).unwrap();
    }
    parent.link(&child).unwrap();
    assert_eq!(parent.value_by_name("u64").unwrap(), 42);
}

#[test]
fn duplicate_binding_rejected() {
    let mut backing = Backing::boxed(0, 0, false, 0, 0);
    let src = Source::new("node0", "kind");
    let base = base_of(&mut backing);
    unsafe {
        src.bind(&SIMPLE_VALUES, base).unwrap();
        assert_eq!(
            src.bind(&SIMPLE_VALUES, base).unwrap_err(),
            StatError::AlreadyExists
        );
    }
    assert_eq!(src.binding_count(), 1);
    // same array at a different base is a different binding
    let mut other = Backing::boxed(0, 0, false, 0, 0);
    unsafe {
        src.bind(&SIMPLE_VALUES, base_of(&mut other)).unwrap();
    }
    assert_eq!(src.binding_count(), 2);
}

#[test]
fn unlink_drops_subtree_contribution() {
    let mut a = Backing::boxed(64, 0, true, 0, 0);
    let mut b = Backing::boxed(64, 0, true, 0, 0);
    let (parent, _a, child_b) = sibling_tree(&mut a, &mut b);
    assert_eq!(parent.value_by_name("u64").unwrap(), 128);
    parent.unlink(&child_b).unwrap();
    assert_eq!(parent.value_by_name("u64").unwrap(), 64);
    assert_eq!(parent.subordinate_count(), 1);
    // a second unlink has nothing to find
    assert_eq!(parent.unlink(&child_b).unwrap_err(), StatError::NotFound);
}

#[test]
fn clear_round_trip() {
    let mut backing = Backing::boxed(64, -5, true, 9, 10000);
    let src = Source::new("node0", "kind");
    unsafe {
        src.bind(&SIMPLE_VALUES, base_of(&mut backing)).unwrap();
    }
    src.clear_by_name("u64").unwrap();
    assert_eq!(src.value_by_name("u64").unwrap(), 0);
    assert_eq!(backing.u64v, 0);
    // the others stay untouched
    assert_eq!(src.value_by_name("s16").unwrap() as i64, 10000);
}

#[test]
fn clear_aggregate_zeroes_the_subtree() {
    let mut a = Backing::boxed(64, 1, true, 2, 3);
    let mut b = Backing::boxed(64, 4, false, 5, 6);
    let (parent, child_a, child_b) = sibling_tree(&mut a, &mut b);
    parent.clear_by_name("u64").unwrap();
    assert_eq!(parent.value_by_name("u64").unwrap(), 0);
    multi_assert_eq!(
        child_a.value_by_name("u64").unwrap(),
        child_b.value_by_name("u64").unwrap(),
        a.u64v,
        b.u64v => 0
    );
    // sibling fields of the same backing objects survive
    assert_eq!(a.s32v, 1);
    assert_eq!(b.u8v, 5);
}

#[test]
fn revoke_neutralises_reads_and_aggregates() {
    let mut a = Backing::boxed(64, 0, true, 0, 0);
    let mut b = Backing::boxed(100, 0, true, 0, 0);
    let (parent, _a, child_b) = sibling_tree(&mut a, &mut b);
    assert_eq!(parent.value_by_name("u64").unwrap(), 164);
    child_b.revoke();
    // the ancestor aggregate no longer sees b
    assert_eq!(parent.value_by_name("u64").unwrap(), 64);
    // and b's own reads resolve to zero rather than failing
    assert_eq!(child_b.value_by_name("u64").unwrap(), 0);

    // a plain simple binding reads zero after revocation too
    let mut c = Backing::boxed(7, 0, false, 0, 0);
    let simple = Source::new("plain", "kind");
    unsafe {
        simple.bind(&SIMPLE_VALUES, base_of(&mut c)).unwrap();
    }
    assert_eq!(simple.value_by_name("u64").unwrap(), 7);
    simple.revoke();
    assert_eq!(simple.value_by_name("u64").unwrap(), 0);
}

#[test]
fn empty_subtree_reduces_to_sentinels() {
    let parent = Source::new("lonely", "node");
    parent.bind_aggregates(&AGGR_VALUES).unwrap();
    assert_eq!(parent.value_by_name("u64").unwrap(), 0);
    assert_eq!(parent.value_by_name("s32").unwrap() as i64, i64::MAX);
    assert_eq!(parent.value_by_name("s16").unwrap() as i64, i64::MIN);
    assert_eq!(parent.value_by_name("bo").unwrap(), 0);
    assert_eq!(parent.value_by_name("u8").unwrap(), 0);
}

#[test]
fn name_tie_break_prefers_first_binding() {
    let mut a = Backing::boxed(1, 0, false, 0, 0);
    let mut b = Backing::boxed(2, 0, false, 0, 0);
    let src = Source::new("node0", "kind");
    unsafe {
        src.bind(&SIMPLE_VALUES, base_of(&mut a)).unwrap();
        src.bind(&AGGR_VALUES, base_of(&mut b)).unwrap();
    }
    // both arrays carry "u64"; the binding added first resolves
    assert_eq!(src.value_by_name("u64").unwrap(), 1);
}

#[test]
fn labels_grow_by_one_per_link() {
    let root = Source::new("vm7", "vm");
    let child = Source::new("vcpu0", "vcpu");
    let grandchild = Source::new("tlb", "unit");
    root.link(&child).unwrap();
    child.link(&grandchild).unwrap();
    assert_eq!(root.labels().len(), 1);
    assert_eq!(child.labels().len(), 2);
    assert_eq!(grandchild.labels().len(), 3);
    // leaf first, then ancestors in order
    let labels = grandchild.labels();
    assert_eq!(&*labels[0].0, "unit");
    assert_eq!(&*labels[0].1, "tlb");
    assert_eq!(&*labels[1].0, "vcpu");
    assert_eq!(&*labels[1].1, "vcpu0");
    assert_eq!(&*labels[2].0, "vm");
    assert_eq!(&*labels[2].1, "vm7");
    // the child's last label is the parent's last label
    assert_eq!(labels.last(), child.labels().last());
}

#[test]
fn concurrent_aggregation_with_tree_mutation() {
    use rand::Rng;
    let _ = env_logger::builder().is_test(true).try_init();
    let mut rng = rand::thread_rng();
    let v1 = rng.gen_range(1u64..1 << 40);
    let v2 = rng.gen_range(1u64..1 << 40);
    let v3 = rng.gen_range(1u64..1 << 40);
    let mut a = Backing::boxed(v1, 0, true, 0, 0);
    let mut b = Backing::boxed(v2, 0, true, 0, 0);
    let mut c = Backing::boxed(v3, 0, true, 0, 0);
    let (parent, _a, _b) = sibling_tree(&mut a, &mut b);
    let readers: Vec<_> = (0..4)
        .map(|_| {
            let parent = Arc::clone(&parent);
            std::thread::spawn(move || {
                for _ in 0..10_000 {
                    let sum = parent.value_by_name("u64").unwrap();
                    // the third child flickers in and out; a and b stay
                    assert!(sum == v1 + v2 || sum == v1 + v2 + v3);
                }
            })
        })
        .collect();
    let base_c = base_of(&mut c);
    for i in 0..100 {
        let child = Source::new(format!("c{i}"), "node");
        unsafe {
            child.bind(&AGGR_VALUES, base_c).unwrap();
        }
        parent.link(&child).unwrap();
        parent.unlink(&child).unwrap();
    }
    for t in readers {
        t.join().unwrap();
    }
    assert_eq!(parent.value_by_name("u64").unwrap(), v1 + v2);
}
