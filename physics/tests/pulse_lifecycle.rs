use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use physics::{
    CollisionFilter, ElementKind, ElementRef, EventSink, MeshMode, PhysicsError, PhysicsEvent,
    PhysicsWorld, Point3, RayOptions, RigidBody, Transform, Vec3, WorldSettings,
};

const TICK: Duration = Duration::from_nanos(16_666_667);

fn world() -> PhysicsWorld {
    PhysicsWorld::new(WorldSettings::default()).unwrap()
}

fn ground(world: &PhysicsWorld) -> Arc<physics::StaticCollision> {
    let shape = world.create_box_shape(Vec3::new(50.0, 50.0, 0.5)).unwrap();
    world
        .create_static_collision(&shape, Transform::IDENTITY)
        .unwrap()
}

#[test]
fn invalid_shapes_are_rejected_without_registering() {
    let world = world();
    assert!(world.create_sphere_shape(0.0).is_err());
    assert!(world.create_sphere_shape(-1.0).is_err());
    assert!(world.create_capsule_shape(1.0, 0.0).is_err());
    assert!(world.create_cone_shape(-1.0, 1.0).is_err());
    assert!(world.create_cylinder_shape(f32::NAN, 1.0).is_err());
    assert!(world.create_box_shape(Vec3::new(1.0, 0.0, 1.0)).is_err());
    assert_eq!(
        world.create_compound_shape(0).err(),
        Some(PhysicsError::ZeroCapacity)
    );
    assert!(
        world
            .create_convex_hull_shape(vec![Point3::origin(), Point3::new(1.0, 0.0, 0.0)])
            .is_err()
    );
    assert!(
        world
            .create_triangle_mesh_shape(vec![Point3::origin(); 2], MeshMode::Bvh)
            .is_err()
    );
    assert!(world.shapes().is_empty());
}

#[test]
fn body_is_invisible_to_queries_until_the_next_pulse() {
    let world = world();
    let shape = world.create_box_shape(Vec3::repeat(1.0)).unwrap();
    let body = world
        .create_rigid_body(&shape, 1.0, Vec3::zeros(), Vec3::zeros())
        .unwrap();

    let min = Vec3::repeat(-2.0);
    let max = Vec3::repeat(2.0);
    assert!(world.query_box(min, max, CollisionFilter::ALL).rigid_bodies.is_empty());
    assert!(!body.is_in_world());

    world.pulse_with_elapsed(TICK);
    assert!(body.is_in_world());
    assert_eq!(
        world.query_box(min, max, CollisionFilter::ALL).rigid_bodies,
        vec![body.id()]
    );
}

/// Each setup leaves the world so that the next pulse drains without stepping.
fn assert_visible_after_unstepped_pulse(setup: impl Fn(&PhysicsWorld), pulse: impl Fn(&PhysicsWorld)) {
    let world = world();
    setup(&world);
    let shape = world.create_box_shape(Vec3::repeat(1.0)).unwrap();
    let collision = world
        .create_static_collision(&shape, Transform::from_translation(Vec3::new(10.0, 0.0, 0.0)))
        .unwrap();
    let body = world
        .create_rigid_body(&shape, 1.0, Vec3::zeros(), Vec3::zeros())
        .unwrap();

    pulse(&world);
    assert_eq!(world.last_pulse_stats().simulated, Duration::ZERO);
    assert!(body.is_in_world());

    let near = world.query_box(Vec3::repeat(-2.0), Vec3::repeat(2.0), CollisionFilter::ALL);
    assert_eq!(near.rigid_bodies, vec![body.id()]);
    let far = world.query_box(
        Vec3::new(8.0, -2.0, -2.0),
        Vec3::new(12.0, 2.0, 2.0),
        CollisionFilter::ALL,
    );
    assert_eq!(far.static_collisions, vec![collision.id()]);

    let down = world.ray_cast(Vec3::new(10.0, 0.0, 10.0), Vec3::new(10.0, 0.0, -10.0), RayOptions::default());
    assert_eq!(
        down.map(|hit| hit.element),
        Some(ElementRef::new(ElementKind::StaticCollision, collision.id()))
    );
    assert!(world.line_cast(Vec3::new(0.0, 0.0, 10.0), Vec3::zeros(), RayOptions::default()));
}

#[test]
fn first_pulse_makes_new_elements_queryable() {
    assert_visible_after_unstepped_pulse(|_| {}, |world| {
        world.do_pulse();
    });
}

#[test]
fn paused_world_still_registers_for_queries() {
    assert_visible_after_unstepped_pulse(
        |world| world.set_speed(0.0).unwrap(),
        |world| {
            world.pulse_with_elapsed(TICK);
        },
    );
    assert_visible_after_unstepped_pulse(
        |world| world.set_simulation_enabled(false),
        |world| {
            world.pulse_with_elapsed(TICK);
        },
    );
}

#[test]
fn moved_body_is_found_at_its_new_position_while_paused() {
    let world = world();
    world.set_simulation_enabled(false);
    let shape = world.create_box_shape(Vec3::repeat(1.0)).unwrap();
    let body = world
        .create_rigid_body(&shape, 1.0, Vec3::zeros(), Vec3::zeros())
        .unwrap();
    world.pulse_with_elapsed(TICK);

    body.set_position(Vec3::new(0.0, 30.0, 0.0));
    world.pulse_with_elapsed(TICK);
    let old_spot = world.query_box(Vec3::repeat(-2.0), Vec3::repeat(2.0), CollisionFilter::ALL);
    assert!(old_spot.rigid_bodies.is_empty());
    let new_spot = world.query_box(
        Vec3::new(-2.0, 28.0, -2.0),
        Vec3::new(2.0, 32.0, 2.0),
        CollisionFilter::ALL,
    );
    assert_eq!(new_spot.rigid_bodies, vec![body.id()]);
}

/// Creates one body from inside the pulse that reports a body outside the world.
struct SpawnOnEvent {
    world: Mutex<Weak<PhysicsWorld>>,
    spawned: Mutex<Option<Arc<RigidBody>>>,
}

impl EventSink for SpawnOnEvent {
    fn call_event(&self, _event: &PhysicsEvent) -> bool {
        let mut spawned = self.spawned.lock().unwrap();
        if spawned.is_none() {
            if let Some(world) = self.world.lock().unwrap().upgrade() {
                let shape = world.create_sphere_shape(0.5).unwrap();
                *spawned = Some(
                    world
                        .create_rigid_body(&shape, 1.0, Vec3::zeros(), Vec3::zeros())
                        .unwrap(),
                );
            }
        }
        false
    }
}

#[test]
fn body_created_during_a_pulse_registers_in_the_next_one() {
    let sink = Arc::new(SpawnOnEvent {
        world: Mutex::new(Weak::new()),
        spawned: Mutex::new(None),
    });
    let settings = WorldSettings {
        world_size: Vec3::new(100.0, 100.0, 10.0),
        clear_outside_world: true,
        ..Default::default()
    };
    let world = Arc::new(PhysicsWorld::with_collaborators(settings, sink.clone(), None).unwrap());
    *sink.world.lock().unwrap() = Arc::downgrade(&world);

    let shape = world.create_sphere_shape(0.5).unwrap();
    let lost = world
        .create_rigid_body(&shape, 1.0, Vec3::zeros(), Vec3::zeros())
        .unwrap();
    lost.set_position(Vec3::new(0.0, 0.0, -20.0));

    let first = world.pulse_with_elapsed(TICK);
    assert_eq!(first.registered_rigid_bodies, 1);
    let spawned = sink.spawned.lock().unwrap().clone().unwrap();
    assert!(!spawned.is_in_world());

    let second = world.pulse_with_elapsed(TICK);
    assert_eq!(second.registered_rigid_bodies, 1);
    assert!(spawned.is_in_world());
}

#[test]
fn constraints_across_worlds_are_rejected() {
    let first = world();
    let second = world();
    let a = first
        .create_rigid_body(&first.create_sphere_shape(1.0).unwrap(), 1.0, Vec3::zeros(), Vec3::zeros())
        .unwrap();
    let b = second
        .create_rigid_body(&second.create_sphere_shape(1.0).unwrap(), 1.0, Vec3::zeros(), Vec3::zeros())
        .unwrap();

    assert!(matches!(
        first.create_point_to_point_constraint(&a, &b, None, false),
        Err(PhysicsError::CrossWorld(_))
    ));
    assert!(matches!(
        first.create_fixed_constraint(&a, &b, false),
        Err(PhysicsError::CrossWorld(_))
    ));
    assert!(first.constraints().is_empty());
    assert!(a.constraints().is_empty());
}

#[test]
fn shape_outlives_the_bodies_using_it() {
    let world = world();
    let shape = world.create_sphere_shape(1.0).unwrap();
    let body = world
        .create_rigid_body(&shape, 1.0, Vec3::zeros(), Vec3::zeros())
        .unwrap();
    world.pulse_with_elapsed(TICK);

    assert!(matches!(
        world.destroy_shape(&shape),
        Err(PhysicsError::ShapeInUse { rigid_bodies: 1, .. })
    ));
    assert!(world.shape(shape.id()).is_some());

    world.destroy_rigid_body(&body).unwrap();
    world.destroy_shape(&shape).unwrap();
    assert!(world.shapes().is_empty());
}

#[test]
fn stale_collision_reports_are_cleared() {
    let world = world();
    world.set_collision_reports(true);
    let ground = ground(&world);
    let shape = world.create_box_shape(Vec3::repeat(0.5)).unwrap();
    let body = world
        .create_rigid_body(&shape, 1.0, Vec3::zeros(), Vec3::zeros())
        .unwrap();
    body.set_position(Vec3::new(0.0, 0.0, 0.9));

    for _ in 0..10 {
        world.pulse_with_elapsed(TICK);
    }
    let reports = body.collision_reports();
    assert_eq!(reports.len(), 1, "{reports:?}");
    assert_eq!(
        reports[0].counterpart,
        ElementRef::new(ElementKind::StaticCollision, ground.id())
    );
    assert!(!reports[0].contacts.is_empty());
    assert_eq!(ground.collision_reports().len(), 1);

    body.set_position(Vec3::new(0.0, 0.0, 40.0));
    world.pulse_with_elapsed(TICK);
    assert!(body.collision_reports().is_empty());
    assert!(ground.collision_reports().is_empty());

    world.set_collision_reports(false);
    assert!(body.collision_reports().is_empty());
}

#[test]
fn removing_a_body_twice_is_a_no_op() {
    let world = world();
    let shape = world.create_sphere_shape(0.5).unwrap();
    let body = world
        .create_rigid_body(&shape, 1.0, Vec3::zeros(), Vec3::zeros())
        .unwrap();
    let other = world
        .create_rigid_body(&shape, 1.0, Vec3::zeros(), Vec3::zeros())
        .unwrap();
    world.pulse_with_elapsed(TICK);

    world.destroy_rigid_body(&body).unwrap();
    world.destroy_rigid_body(&body).unwrap();
    world.destroy_element(&physics::Element::RigidBody(Arc::clone(&body))).unwrap();
    assert_eq!(world.rigid_bodies().len(), 1);
    assert!(other.is_in_world());
    assert_eq!(shape.rigid_bodies(), vec![other.id()]);
}

#[test]
fn box_falls_under_gravity() {
    let world = PhysicsWorld::new(WorldSettings {
        gravity: Vec3::new(0.0, 0.0, -9.8),
        ..Default::default()
    })
    .unwrap();
    let shape = world.create_box_shape(Vec3::repeat(1.0)).unwrap();
    let body = world
        .create_rigid_body(&shape, 1.0, Vec3::zeros(), Vec3::zeros())
        .unwrap();

    world.pulse_with_elapsed(TICK);
    assert!(body.position().z < 0.0, "{:?}", body.position());
    assert!(body.linear_velocity().z < 0.0);
    assert!(world.active_rigid_bodies().contains(&body.id()));
}

#[test]
fn box_comes_to_rest_on_the_ground() {
    let world = world();
    ground(&world);
    let shape = world.create_box_shape(Vec3::repeat(0.5)).unwrap();
    let body = world
        .create_rigid_body(&shape, 1.0, Vec3::zeros(), Vec3::zeros())
        .unwrap();
    body.set_position(Vec3::new(0.0, 0.0, 3.0));

    for _ in 0..180 {
        world.pulse_with_elapsed(TICK);
    }
    let z = body.position().z;
    assert!((z - 1.0).abs() < 0.1, "{z}");
    assert!(
        world
            .ray_cast(Vec3::new(0.0, 0.0, 10.0), Vec3::zeros(), RayOptions::default())
            .is_some_and(|hit| hit.element.id == body.id())
    );
}

#[test]
fn query_box_finds_the_static_collision() {
    let world = world();
    let shape = world.create_box_shape(Vec3::repeat(1.0)).unwrap();
    let collision = world
        .create_static_collision(&shape, Transform::from_translation(Vec3::new(10.0, 0.0, 0.0)))
        .unwrap();
    world.pulse_with_elapsed(TICK);

    let result = world.query_box(
        Vec3::new(8.0, -2.0, -2.0),
        Vec3::new(12.0, 2.0, 2.0),
        CollisionFilter::ALL,
    );
    assert_eq!(result.static_collisions, vec![collision.id()]);
    assert!(result.rigid_bodies.is_empty());
}

#[test]
fn point_to_point_constraint_breaks_under_force() {
    let world = PhysicsWorld::new(WorldSettings {
        gravity: Vec3::zeros(),
        ..Default::default()
    })
    .unwrap();
    let shape = world.create_sphere_shape(0.5).unwrap();
    let a = world
        .create_rigid_body(&shape, 1.0, Vec3::zeros(), Vec3::zeros())
        .unwrap();
    let b = world
        .create_rigid_body(&shape, 1.0, Vec3::zeros(), Vec3::zeros())
        .unwrap();
    let constraint = world
        .create_point_to_point_constraint(&a, &b, Some((Vec3::zeros(), Vec3::zeros())), true)
        .unwrap();
    constraint.set_breaking_impulse_threshold(0.01).unwrap();
    world.pulse_with_elapsed(Duration::ZERO);
    assert!(constraint.is_enabled());
    assert!(!constraint.is_broken());

    a.apply_central_force(Vec3::new(1000.0, 0.0, 0.0));
    let stats = world.pulse_with_elapsed(TICK);

    assert!(constraint.is_broken());
    assert!(!constraint.is_enabled());
    assert!(constraint.applied_impulse() > 0.01);
    assert_eq!(stats.broken_constraints, 1);
    assert!(constraint.breaking_status_has_changed());
    assert!(!constraint.breaking_status_has_changed());
}

#[test]
fn compound_contacts_are_reported_at_the_part() {
    let world = world();
    world.set_collision_reports(true);
    ground(&world);
    let part = world.create_box_shape(Vec3::repeat(0.5)).unwrap();
    let compound = world.create_compound_shape(1).unwrap();
    compound
        .add_child_shape(&part, Transform::from_translation(Vec3::new(5.0, 0.0, 0.0)))
        .unwrap();
    let body = world
        .create_rigid_body(&compound, 1.0, Vec3::zeros(), Vec3::zeros())
        .unwrap();
    // Part rests over the origin, the body origin hangs in the air at x = -5.
    body.set_position(Vec3::new(-5.0, 0.0, 0.95));

    for _ in 0..3 {
        world.pulse_with_elapsed(TICK);
    }
    let reports = body.collision_reports();
    assert!(!reports.is_empty());
    for contact in reports.iter().flat_map(|r| &r.contacts) {
        assert!(contact.world_point.x.abs() < 1.0, "{contact:?}");
        assert_eq!(contact.part_index, Some(0));
    }
}
