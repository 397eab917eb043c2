//! A foggy courtyard: ground slab, a ring of columns, and low walls, all
//! sharing one fog clock. The fog override is installed before the pipeline
//! is built, so every material compiled afterwards picks up the layered-noise
//! fog term.

use brume::*;

fn main() {
    run_with_config(AppConfig::new().title("Brume Fog").size(1280, 720), |ctx| {
        ctx.chunks
            .install_fog_override(FogFalloff::Exponential { density: 0.05 });

        let fog = FogTicker::new();
        fog.attach(ctx.registry);

        let plane = ctx.scene.add_mesh(Mesh::plane(ctx.gpu, 80.0));
        let column = ctx.scene.add_mesh(Mesh::cylinder(ctx.gpu, 0.8, 7.0, 32));
        let block = ctx.scene.add_mesh(Mesh::cube(ctx.gpu, Vec3::new(10.0, 2.5, 1.0)));

        let ground = MaterialTemplate::phong(Color::rgb(0.23, 0.25, 0.22))
            .with_fog(true)
            .clone_instance(ctx.registry)
            .unwrap();
        fog.subscribe(&ground);
        ctx.scene.add_drawable(plane, Transform::new(), ground);

        // Every column shares one material instance; the fog clock only has
        // to reach it once.
        let stone = MaterialTemplate::phong(Color::from_hex_or("#8a8f98", Color::WHITE))
            .with_fog(true)
            .clone_instance(ctx.registry)
            .unwrap();
        fog.subscribe(&stone);
        for i in 0..10 {
            let angle = std::f32::consts::TAU * i as f32 / 10.0;
            let entity = ctx.scene.add_drawable(
                column,
                Transform::from_position(Vec3::new(
                    angle.cos() * 12.0,
                    3.5,
                    angle.sin() * 12.0,
                )),
                stone.clone_shared(),
            );
            if i == 0 {
                ctx.scene.set_outlined(entity, true);
            }
        }

        let wall = MaterialTemplate::phong(Color::from_hex_or("#5d6670", Color::WHITE))
            .with_fog(true)
            .clone_instance(ctx.registry)
            .unwrap();
        fog.subscribe(&wall);
        for (position, quarter_turns) in [
            (Vec3::new(0.0, 1.25, -20.0), 0.0),
            (Vec3::new(-20.0, 1.25, 0.0), 1.0),
            (Vec3::new(0.0, 1.25, 20.0), 2.0),
        ] {
            ctx.scene.add_drawable(
                block,
                Transform::from_position(position).rotation(Quat::from_rotation_y(
                    quarter_turns * std::f32::consts::FRAC_PI_2,
                )),
                wall.clone_shared(),
            );
        }

        ctx.scene.add_light(Light::Directional {
            direction: Vec3::new(-0.4, -1.0, -0.3),
            color: Vec3::new(0.9, 0.87, 0.8),
        });
        ctx.scene.add_light(Light::Ambient {
            color: Vec3::splat(0.25),
        });

        ctx.camera(
            Camera::new()
                .at(22.0, 10.0, 22.0)
                .looking_at(0.0, 2.0, 0.0)
                .with_fov(55.0),
        );
        ctx.standard_pipeline(
            Color::rgb(0.875, 0.914, 0.953),
            1.0,
            OutlineSettings::default(),
        );

        move |_frame| {}
    });
}
