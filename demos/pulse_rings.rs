//! A cylinder wearing the animated ring-stripe material, re-pulsed every few
//! seconds. The ring bands scroll on the clone's own clock; the pulse is a
//! separate caller-driven decay timer feeding the `u_pulse` uniform.

use std::cell::RefCell;
use std::rc::Rc;

use brume::*;

const PULSE_PERIOD: f32 = 2.5;

fn main() {
    run_with_config(
        AppConfig::new().title("Brume Pulse Rings").size(1280, 720),
        |ctx| {
            let cylinder = ctx.scene.add_mesh(Mesh::cylinder(ctx.gpu, 2.0, 6.0, 48));
            let floor = ctx.scene.add_mesh(Mesh::plane(ctx.gpu, 30.0));

            let base = MaterialTemplate::phong(Color::rgb(0.15, 0.16, 0.2))
                .clone_instance(ctx.registry)
                .unwrap();
            ctx.scene.add_drawable(floor, Transform::new(), base);

            // An opaque core inside the translucent ring shell.
            let core = MaterialTemplate::extrusion(Color::rgb(0.1, 0.1, 0.12))
                .clone_instance(ctx.registry)
                .unwrap();
            core.set_float("u_y", 6.0);
            ctx.scene.add_drawable(
                cylinder,
                Transform::from_position(Vec3::new(0.0, 3.0, 0.0)).uniform_scale(0.9),
                core,
            );

            let rings = MaterialTemplate::rings()
                .clone_instance(ctx.registry)
                .unwrap();
            ctx.scene.add_drawable(
                cylinder,
                Transform::from_position(Vec3::new(0.0, 3.0, 0.0)),
                rings.clone_shared(),
            );

            // The decay timer ticks with the registry; the frame closure only
            // retriggers it.
            let pulse = Rc::new(RefCell::new(PulseTimer::new(0.7)));
            {
                let pulse = Rc::clone(&pulse);
                let rings = rings.clone_shared();
                ctx.registry.register(move |dt: f32| {
                    let mut pulse = pulse.borrow_mut();
                    pulse.advance(dt);
                    rings.set_float("u_pulse", pulse.value());
                });
            }

            ctx.scene.add_light(Light::Directional {
                direction: Vec3::new(-0.5, -1.0, -0.2),
                color: Vec3::new(0.8, 0.8, 0.85),
            });
            ctx.scene.add_light(Light::Ambient {
                color: Vec3::splat(0.2),
            });

            ctx.camera(
                Camera::new()
                    .at(10.0, 7.0, 10.0)
                    .looking_at(0.0, 3.0, 0.0)
                    .with_fov(50.0),
            );
            ctx.standard_pipeline(Color::rgb(0.02, 0.02, 0.04), 1.0, OutlineSettings::default());

            let mut next_pulse = 0.0f32;
            move |frame| {
                if frame.time >= next_pulse {
                    pulse.borrow_mut().trigger();
                    next_pulse = frame.time + PULSE_PERIOD;
                }
            }
        },
    );
}
