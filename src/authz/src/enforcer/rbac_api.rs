//! Role-based access control conveniences over any [`Authorizer`]

use async_trait::async_trait;
use indexmap::IndexSet;
use std::collections::VecDeque;

use super::Authorizer;
use crate::error::Result;

fn grouping_rule(user: &str, role: &str, domain: Option<&str>) -> Vec<String> {
    let mut rule = vec![user.to_string(), role.to_string()];
    rule.extend(domain.map(str::to_string));
    rule
}

/// RBAC API over the default `g` role definition and `p` policy
#[async_trait]
pub trait RbacApi: Authorizer {
    /// Direct roles of a user
    async fn get_roles_for_user(&self, name: &str, domain: Option<&str>) -> Result<Vec<String>> {
        self.direct_roles("g", name, domain).await
    }

    /// Direct members of a role
    async fn get_users_for_role(&self, name: &str, domain: Option<&str>) -> Result<Vec<String>> {
        self.direct_users("g", name, domain).await
    }

    async fn get_roles_for_user_in_domain(&self, name: &str, domain: &str) -> Result<Vec<String>> {
        self.direct_roles("g", name, Some(domain)).await
    }

    /// Whether `role` is a direct role of `name`
    async fn has_role_for_user(&self, name: &str, role: &str, domain: Option<&str>) -> Result<bool> {
        Ok(self
            .get_roles_for_user(name, domain)
            .await?
            .iter()
            .any(|r| r == role))
    }

    async fn add_role_for_user(&mut self, user: &str, role: &str, domain: Option<&str>) -> Result<bool> {
        self.add_rules("g", "g", vec![grouping_rule(user, role, domain)]).await
    }

    async fn delete_role_for_user(&mut self, user: &str, role: &str, domain: Option<&str>) -> Result<bool> {
        self.remove_rules("g", "g", vec![grouping_rule(user, role, domain)]).await
    }

    /// Remove every role of a user
    async fn delete_roles_for_user(&mut self, user: &str, domain: Option<&str>) -> Result<bool> {
        let filter = grouping_rule(user, "", domain);
        self.remove_filtered_rules("g", "g", 0, filter).await
    }

    /// Remove a user from role links and policy
    async fn delete_user(&mut self, name: &str) -> Result<bool> {
        let links = self
            .remove_filtered_rules("g", "g", 0, vec![name.to_string()])
            .await?;
        let rules = self
            .remove_filtered_rules("p", "p", 0, vec![name.to_string()])
            .await?;
        Ok(links || rules)
    }

    /// Remove a role from role links and policy
    async fn delete_role(&mut self, name: &str) -> Result<bool> {
        let links = self
            .remove_filtered_rules("g", "g", 1, vec![name.to_string()])
            .await?;
        let rules = self
            .remove_filtered_rules("p", "p", 0, vec![name.to_string()])
            .await?;
        Ok(links || rules)
    }

    async fn add_permission_for_user(&mut self, user: &str, permission: Vec<String>) -> Result<bool> {
        let mut rule = vec![user.to_string()];
        rule.extend(permission);
        self.add_rules("p", "p", vec![rule]).await
    }

    async fn delete_permission_for_user(&mut self, user: &str, permission: Vec<String>) -> Result<bool> {
        let mut rule = vec![user.to_string()];
        rule.extend(permission);
        self.remove_rules("p", "p", vec![rule]).await
    }

    /// Rows naming the user as subject, optionally restricted to a domain
    /// held in the second field
    async fn get_permissions_for_user(&self, user: &str, domain: Option<&str>) -> Vec<Vec<String>> {
        let mut filter = vec![user.to_string()];
        filter.extend(domain.map(str::to_string));
        self.get_filtered_rules("p", "p", 0, filter).await
    }

    async fn has_permission_for_user(&self, user: &str, permission: Vec<String>) -> bool {
        let mut rule = vec![user.to_string()];
        rule.extend(permission);
        self.has_rule("p", "p", rule).await
    }

    /// Every role reachable from `name`, nearest first
    async fn get_implicit_roles_for_user(&self, name: &str, domain: Option<&str>) -> Result<Vec<String>> {
        let mut seen: IndexSet<String> = IndexSet::new();
        let mut queue = VecDeque::from([name.to_string()]);

        while let Some(current) = queue.pop_front() {
            for role in self.direct_roles("g", &current, domain).await? {
                if role != name && seen.insert(role.clone()) {
                    queue.push_back(role);
                }
            }
        }
        Ok(seen.into_iter().collect())
    }

    /// Rows granted to `name` directly or through any implicit role
    async fn get_implicit_permissions_for_user(
        &self,
        name: &str,
        domain: Option<&str>,
    ) -> Result<Vec<Vec<String>>> {
        let mut subjects = vec![name.to_string()];
        subjects.extend(self.get_implicit_roles_for_user(name, domain).await?);

        let mut permissions = Vec::new();
        for subject in &subjects {
            permissions.extend(self.get_permissions_for_user(subject, domain).await);
        }
        Ok(permissions)
    }
}

impl<T: Authorizer + ?Sized> RbacApi for T {}
