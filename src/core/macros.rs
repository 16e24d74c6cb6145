//! 核心宏定义
//!
//! 提供统一的宏来减少代码重复

/// 为结构体实现Default trait的宏
///
/// 使用示例:
/// ```rust
/// use particle_engine::impl_default;
///
/// struct PoolSettings {
///     capacity: u32,
///     growth: f32,
/// }
///
/// impl_default!(PoolSettings {
///     capacity: 64,
///     growth: 1.25,
/// });
///
/// assert_eq!(PoolSettings::default().capacity, 64);
/// ```
#[macro_export]
macro_rules! impl_default {
    ($struct_name:ident {
        $($field:ident: $value:expr),* $(,)?
    }) => {
        impl Default for $struct_name {
            fn default() -> Self {
                Self {
                    $($field: $value),*
                }
            }
        }
    };
}

/// 将 Pod 结构体注册为粒子载荷类型
///
/// 为每个类型实现 `ParticlePayload`，并在编译期断言大小是 4 字节对齐的，
/// 保证载荷区偏移在粒子步长内始终满足 `f32`/`u32` 的对齐要求。
///
/// 使用示例:
/// ```rust
/// use particle_engine::impl_payload;
///
/// #[repr(C)]
/// #[derive(Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
/// struct SparkPayload {
///     heat: f32,
/// }
///
/// impl_payload!(SparkPayload);
/// ```
#[macro_export]
macro_rules! impl_payload {
    ($($payload:ty),+ $(,)?) => {
        $(
            impl $crate::particles::payload::ParticlePayload for $payload {
                const SIZE: usize = ::std::mem::size_of::<$payload>();
            }

            const _: () = assert!(::std::mem::size_of::<$payload>() % 4 == 0);
        )+
    };
}
